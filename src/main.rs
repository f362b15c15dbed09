use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::path::PathBuf;
use std::process;
use tokio::sync::mpsc;

use hostsweep::{
    config::{CheckKind, SweepConfig},
    credential::Credential,
    output::{OutputConfig, OutputFormat, OutputManager},
    probe::command::PASSWORD_ENV,
    sweep::SweepEngine,
    target::DirectoryQuery,
    utils::Logger,
    SweepError,
};

fn print_banner() {
    println!("{}", " _               _                              ".truecolor(52, 152, 219).bold());
    println!("{}", "| |__   ___  ___| |_ _____      _____  ___ _ __  ".truecolor(52, 152, 219).bold());
    println!("{}", "| '_ \\ / _ \\/ __| __/ __\\ \\ /\\ / / _ \\/ _ \\ '_ \\ ".truecolor(52, 152, 219).bold());
    println!("{}", "| | | | (_) \\__ \\ |_\\__ \\\\ V  V /  __/  __/ |_) |".truecolor(52, 152, 219).bold());
    println!("{}", "|_| |_|\\___/|___/\\__|___/ \\_/\\_/ \\___|\\___| .__/ ".truecolor(52, 152, 219).bold());
    println!("{}", "                                          |_|    ".truecolor(52, 152, 219).bold());
    println!();
    println!("{}", format!("hostsweep {} - who can get in where", env!("CARGO_PKG_VERSION")).bright_blue());
    println!();
}

fn parse_jitter(value: &str) -> Result<f64, String> {
    let jitter: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if (0.0..=1.0).contains(&jitter) {
        Ok(jitter)
    } else {
        Err("jitter must be between 0.0 and 1.0".to_string())
    }
}

fn build_cli() -> Command {
    Command::new("hostsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sweep a set of hosts and report where the given identity has access")
        .arg(
            Arg::new("hosts")
                .value_name("HOSTS")
                .help("Hosts to probe (names, addresses or CIDR blocks, comma separated allowed)")
                .num_args(0..)
                .index(1),
        )
        .arg(
            Arg::new("computer-name")
                .long("computer-name")
                .value_name("HOSTS")
                .help("Comma separated list of hosts to probe")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("input-file")
                .short('i')
                .long("input-file")
                .value_name("FILE")
                .help("Read hosts from file (plain text, CSV or JSON)"),
        )
        // Directory scoping, used when no explicit hosts are given
        .arg(Arg::new("domain").long("domain").value_name("DOMAIN").help("Domain to enumerate hosts from"))
        .arg(Arg::new("ldap-filter").long("ldap-filter").value_name("FILTER").help("Extra LDAP filter for host enumeration"))
        .arg(Arg::new("search-base").long("search-base").value_name("DN").help("Search base for host enumeration"))
        .arg(Arg::new("operating-system").long("operating-system").value_name("OS").help("Only hosts running this operating system"))
        .arg(Arg::new("service-pack").long("service-pack").value_name("SP").help("Only hosts with this service pack"))
        .arg(Arg::new("site-name").long("site-name").value_name("SITE").help("Only hosts in this site"))
        .arg(Arg::new("server").long("server").value_name("DC").help("Directory server to query"))
        .arg(
            Arg::new("unconstrained")
                .long("unconstrained")
                .help("Only hosts trusted for unconstrained delegation")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("enumerator")
                .long("enumerator")
                .value_name("CMD")
                .help("Command that prints one host per line for a directory query"),
        )
        // Pacing
        .arg(
            Arg::new("delay")
                .long("delay")
                .value_name("SECONDS")
                .help("Pause between probes; enables sequential mode when > 0")
                .value_parser(clap::value_parser!(u64).range(0..=10_000)),
        )
        .arg(
            Arg::new("jitter")
                .long("jitter")
                .value_name("FRACTION")
                .help("Randomize the delay by this fraction (0.0-1.0)")
                .value_parser(parse_jitter),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("COUNT")
                .help("Number of concurrent workers (1-100)")
                .value_parser(clap::value_parser!(u64).range(1..=100)),
        )
        // Credentials
        .arg(Arg::new("username").short('U').long("username").value_name("USER").help("Probe as this user"))
        .arg(Arg::new("user-domain").short('D').long("user-domain").value_name("DOMAIN").help("Domain of --username"))
        .arg(
            Arg::new("password")
                .short('P')
                .long("password")
                .value_name("PASSWORD")
                .help("Password of --username (or set HOSTSWEEP_PASSWORD)"),
        )
        // Check
        .arg(
            Arg::new("check")
                .long("check")
                .value_name("KIND")
                .help("Access check to run")
                .value_parser(["command", "port"]),
        )
        .arg(
            Arg::new("check-command")
                .long("check-command")
                .value_name("TEMPLATE")
                .help("Access check command; {host}, {user} and {domain} are substituted"),
        )
        .arg(
            Arg::new("check-port")
                .long("check-port")
                .value_name("PORT")
                .help("Port for the port check")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("no-ping")
                .long("no-ping")
                .help("Skip the liveness check")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("liveness-ports")
                .long("liveness-ports")
                .value_name("PORTS")
                .help("Comma separated ports for the liveness check")
                .value_delimiter(',')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Connect timeout in milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("probe-timeout")
                .long("probe-timeout")
                .value_name("MS")
                .help("Limit for one probe in milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("enumerator-timeout")
                .long("enumerator-timeout")
                .value_name("SECONDS")
                .help("Limit for one enumerator run in seconds")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("stop-on-success")
                .long("stop-on-success")
                .help("Stop after the first host with access")
                .action(ArgAction::SetTrue),
        )
        // Output
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Output format")
                .value_parser(["text", "json", "csv", "greppable"])
                .default_value("text"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Write results to a file instead of stdout"),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .help("Show every host, not only those with access")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-banner")
                .long("no-banner")
                .help("Hide the banner")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
}

fn string_arg(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.get_one::<String>(name).cloned()
}

/// Fold command line flags over the file configuration
fn apply_cli(matches: &ArgMatches, mut config: SweepConfig) -> anyhow::Result<SweepConfig> {
    let mut hosts: Vec<String> = matches
        .get_many::<String>("hosts")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if let Some(names) = matches.get_many::<String>("computer-name") {
        hosts.extend(names.cloned());
    }
    if !hosts.is_empty() {
        config.targets = hosts;
    }
    if let Some(file) = string_arg(matches, "input-file") {
        config.targets_file = Some(PathBuf::from(file));
    }

    let query = DirectoryQuery {
        domain: string_arg(matches, "domain"),
        ldap_filter: string_arg(matches, "ldap-filter"),
        search_base: string_arg(matches, "search-base"),
        operating_system: string_arg(matches, "operating-system"),
        service_pack: string_arg(matches, "service-pack"),
        site_name: string_arg(matches, "site-name"),
        server: string_arg(matches, "server"),
        unconstrained: matches.get_flag("unconstrained"),
    };
    if !query.is_empty() {
        config.query = Some(query);
    }
    if let Some(enumerator) = string_arg(matches, "enumerator") {
        config.enumerator = Some(enumerator);
    }

    if let Some(&delay) = matches.get_one::<u64>("delay") {
        config.delay = delay;
    }
    if let Some(&jitter) = matches.get_one::<f64>("jitter") {
        config.jitter = jitter;
    }
    if let Some(&threads) = matches.get_one::<u64>("threads") {
        config.threads = threads as usize;
    }

    if let Some(username) = string_arg(matches, "username") {
        let password = string_arg(matches, "password")
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .ok_or_else(|| anyhow!("--username needs --password or {}", PASSWORD_ENV))?;
        let mut credential = Credential::new(username, password);
        if let Some(domain) = string_arg(matches, "user-domain") {
            credential = credential.with_domain(domain);
        }
        config.credential = Some(credential);
    }

    if let Some(kind) = matches.get_one::<String>("check") {
        config.check = kind.parse::<CheckKind>().map_err(|e| anyhow!(e))?;
    }
    if let Some(template) = string_arg(matches, "check-command") {
        config.check_command = Some(template);
    }
    if let Some(&port) = matches.get_one::<u16>("check-port") {
        config.check_port = port;
    }
    if matches.get_flag("no-ping") {
        config.liveness = false;
    }
    if let Some(ports) = matches.get_many::<u16>("liveness-ports") {
        config.liveness_ports = ports.copied().collect();
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config.connect_timeout = timeout;
    }
    if let Some(&timeout) = matches.get_one::<u64>("probe-timeout") {
        config.probe_timeout = timeout;
    }
    if let Some(&timeout) = matches.get_one::<u64>("enumerator-timeout") {
        config.enumerator_timeout = timeout;
    }
    if matches.get_flag("stop-on-success") {
        config.stop_on_success = true;
    }

    Ok(config)
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    let format: OutputFormat = matches
        .get_one::<String>("output-format")
        .map(|s| s.parse())
        .transpose()
        .map_err(|e: String| anyhow!(e))?
        .unwrap_or(OutputFormat::Text);

    if format == OutputFormat::Text && !matches.get_flag("no-banner") {
        print_banner();
    }

    let base_config = match string_arg(&matches, "config") {
        Some(path) => SweepConfig::from_toml_file(&path)
            .with_context(|| format!("Failed to load config file {}", path))?,
        None => SweepConfig::load_default_config(),
    };
    let config = apply_cli(&matches, base_config)?;

    let engine = SweepEngine::from_config(config)?;

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "[~] Interrupted, finishing current probes...".bright_yellow());
            cancel.cancel();
        }
    });

    let mut output = OutputManager::new(OutputConfig {
        format,
        file: string_arg(&matches, "output-file"),
        colored: !matches.get_flag("no-color"),
        show_all: matches.get_flag("all"),
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = async {
        while let Some(outcome) = rx.recv().await {
            output.write_outcome(&outcome)?;
        }
        Ok::<_, SweepError>(())
    };
    let (summary, printed) = tokio::join!(engine.run(tx), printer);

    let summary = summary?;
    printed?;
    output.write_summary(&summary)?;
    output.finish()?;

    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    if matches.get_flag("no-color") {
        colored::control::set_override(false);
    }

    let level = if matches.get_flag("verbose") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    Logger::init(level);

    if let Err(e) = run(matches).await {
        eprintln!("{} {:#}", "[!] ERROR:".bright_red().bold(), e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["hostsweep"];
        argv.extend_from_slice(args);
        build_cli().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn test_cli_overrides() {
        let matches = parse(&[
            "dc01,ws01", "--delay", "30", "--jitter", "0.5", "-t", "5", "--check", "port",
            "--no-ping", "--stop-on-success",
        ]);
        let config = apply_cli(&matches, SweepConfig::default()).unwrap();
        assert_eq!(config.targets, vec!["dc01,ws01".to_string()]);
        assert_eq!(config.delay, 30);
        assert_eq!(config.jitter, 0.5);
        assert_eq!(config.threads, 5);
        assert_eq!(config.check, CheckKind::Port);
        assert!(!config.liveness);
        assert!(config.stop_on_success);
    }

    #[test]
    fn test_cli_ranges() {
        let cli = || build_cli();
        assert!(cli().try_get_matches_from(["hostsweep", "--delay", "10001"]).is_err());
        assert!(cli().try_get_matches_from(["hostsweep", "-t", "0"]).is_err());
        assert!(cli().try_get_matches_from(["hostsweep", "-t", "101"]).is_err());
        assert!(cli().try_get_matches_from(["hostsweep", "--jitter", "1.2"]).is_err());
    }

    #[test]
    fn test_cli_query_and_credentials() {
        let matches = parse(&[
            "--domain", "corp.local", "--operating-system", "*Server*", "-U", "alice", "-D",
            "CORP", "-P", "s3cret",
        ]);
        let config = apply_cli(&matches, SweepConfig::default()).unwrap();
        let query = config.query.unwrap();
        assert_eq!(query.domain.as_deref(), Some("corp.local"));
        assert_eq!(query.operating_system.as_deref(), Some("*Server*"));
        let credential = config.credential.unwrap();
        assert_eq!(credential.identity(), "CORP\\alice");
    }

    #[test]
    fn test_cli_liveness_ports() {
        let matches = parse(&["dc01", "--liveness-ports", "22,3389"]);
        let config = apply_cli(&matches, SweepConfig::default()).unwrap();
        assert_eq!(config.liveness_ports, vec![22, 3389]);
    }

    #[test]
    fn test_cli_enumerator_timeout() {
        let matches = parse(&["--domain", "corp.local", "--enumerator-timeout", "60"]);
        let config = apply_cli(&matches, SweepConfig::default()).unwrap();
        assert_eq!(config.enumerator_timeout, 60);

        assert!(build_cli()
            .try_get_matches_from(["hostsweep", "--enumerator-timeout", "0"])
            .is_err());
    }
}
