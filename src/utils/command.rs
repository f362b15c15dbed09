//! External command templates
//!
//! Both the directory resolver and the access-check probe shell out to
//! external tools. A template such as `crackmapexec smb {host} -u {user}` is
//! split into arguments once, and placeholders are substituted per argument
//! so a substituted value can never introduce new arguments.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;

/// Parsed command line with `{name}` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Why a command could not produce a [`CommandOutput`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandFailure {
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

impl CommandTemplate {
    /// Parse a template. Single and double quotes group words.
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut parts = split_words(template)?;
        if parts.is_empty() {
            return Err("Empty command".to_string());
        }
        let program = parts.remove(0);
        Ok(Self { program, args: parts })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether any argument references `{name}`
    pub fn uses(&self, name: &str) -> bool {
        let placeholder = format!("{{{}}}", name);
        self.program.contains(&placeholder) || self.args.iter().any(|a| a.contains(&placeholder))
    }

    /// Substitute placeholders, returning the program and its arguments
    ///
    /// Each part is scanned once. Substituted text is never rescanned, and
    /// unknown placeholders are left as written.
    pub fn render(&self, vars: &HashMap<&str, String>) -> (String, Vec<String>) {
        let program = substitute(&self.program, vars);
        let args = self.args.iter().map(|a| substitute(a, vars)).collect();
        (program, args)
    }

    /// Render and run the command, killing it if it outlives `limit`
    pub async fn run(
        &self,
        vars: &HashMap<&str, String>,
        env: &[(&str, &str)],
        limit: Duration,
    ) -> Result<CommandOutput, CommandFailure> {
        let (program, args) = self.render(vars);
        let mut command = AsyncCommand::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            command.env(key, value);
        }

        let start = Instant::now();
        let child = command
            .spawn()
            .map_err(|e| CommandFailure::Spawn(format!("{}: {}", program, e)))?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                elapsed: start.elapsed(),
            }),
            Ok(Err(e)) => Err(CommandFailure::Spawn(format!("{}: {}", program, e))),
            Err(_) => Err(CommandFailure::TimedOut(limit)),
        }
    }
}

fn substitute(part: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = String::with_capacity(part.len());
    let mut rest = part;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match vars.get(&after[..close]) {
                Some(value) => {
                    result.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    result.push('{');
                    rest = after;
                }
            },
            None => {
                result.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

fn split_words(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(format!("Unterminated quote in command: {}", input));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let t = CommandTemplate::parse("smbcheck --host {host} -q").unwrap();
        assert_eq!(t.program(), "smbcheck");
        assert!(t.uses("host"));
        assert!(!t.uses("user"));
    }

    #[test]
    fn test_parse_quotes() {
        let t = CommandTemplate::parse(r#"sh -c "test '{host}' = B""#).unwrap();
        let mut vars = HashMap::new();
        vars.insert("host", "B".to_string());
        let (program, args) = t.render(&vars);
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c".to_string(), "test 'B' = B".to_string()]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(CommandTemplate::parse("   ").is_err());
        assert!(CommandTemplate::parse("echo \"unterminated").is_err());
    }

    #[test]
    fn test_substituted_value_stays_one_argument() {
        let t = CommandTemplate::parse("check {host}").unwrap();
        let mut vars = HashMap::new();
        vars.insert("host", "evil host --flag".to_string());
        let (_, args) = t.render(&vars);
        assert_eq!(args, vec!["evil host --flag".to_string()]);
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        let t = CommandTemplate::parse("check -u {user} -d {domain} {host} {other}").unwrap();
        let mut vars = HashMap::new();
        vars.insert("user", "{host}".to_string());
        vars.insert("domain", "{user}".to_string());
        vars.insert("host", "dc01".to_string());

        for _ in 0..20 {
            let (_, args) = t.render(&vars);
            assert_eq!(args, vec!["-u", "{host}", "-d", "{user}", "dc01", "{other}"]);
        }
    }

    #[test]
    fn test_braces_without_placeholder() {
        let t = CommandTemplate::parse("awk '{print $1}' {host}x{ {").unwrap();
        let mut vars = HashMap::new();
        vars.insert("host", "h".to_string());
        let (_, args) = t.render(&vars);
        assert_eq!(args, vec!["{print $1}", "hx{", "{"]);
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            CommandFailure::Spawn("nope: not found".to_string()).to_string(),
            "failed to spawn process: nope: not found"
        );
        assert_eq!(
            CommandFailure::TimedOut(Duration::from_secs(2)).to_string(),
            "command timed out after 2s"
        );
    }

    #[test]
    fn test_empty_quoted_argument_is_kept() {
        let t = CommandTemplate::parse("tool '' x").unwrap();
        let (_, args) = t.render(&HashMap::new());
        assert_eq!(args, vec![String::new(), "x".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let t = CommandTemplate::parse("sh -c 'echo {word}; exit 3'").unwrap();
        let mut vars = HashMap::new();
        vars.insert("word", "hello".to_string());
        let out = t.run(&vars, &[], Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let t = CommandTemplate::parse("sleep 5").unwrap();
        let result = t.run(&HashMap::new(), &[], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CommandFailure::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let t = CommandTemplate::parse("definitely-not-a-real-binary-hostsweep").unwrap();
        let result = t.run(&HashMap::new(), &[], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CommandFailure::Spawn(_))));
    }
}
