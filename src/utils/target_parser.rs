//! Target parsing utilities for host lists
//!
//! Explicit host entries are kept verbatim (hostnames are not resolved; the
//! probe decides how to reach them). CIDR blocks are expanded into their
//! individual addresses.

use crate::target::Target;
use anyhow::{Context, Result};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Type of a parsed host entry
#[derive(Debug, Clone, PartialEq)]
pub enum TargetType {
    SingleIpv4,
    SingleIpv6,
    Ipv4Cidr,
    Ipv6Cidr,
    Hostname,
}

/// One parsed entry and the targets it produced
#[derive(Debug, Clone)]
pub struct ParsedTarget {
    pub original: String,
    pub target_type: TargetType,
    pub targets: Vec<Target>,
}

/// Host entry parser with CIDR support
pub struct TargetParser {
    max_cidr_addresses: u64,
    enable_ipv6: bool,
}

impl Default for TargetParser {
    fn default() -> Self {
        Self {
            max_cidr_addresses: 65536, // Limit CIDR expansion
            enable_ipv6: true,
        }
    }
}

impl TargetParser {
    pub fn new(max_cidr_addresses: u64, enable_ipv6: bool) -> Self {
        Self {
            max_cidr_addresses,
            enable_ipv6,
        }
    }

    /// Parse one host entry
    pub fn parse_target(&self, entry: &str) -> Result<ParsedTarget> {
        let entry = entry.trim();
        self.validate_target(entry)?;

        if entry.contains('/') {
            return self.parse_cidr(entry);
        }

        if let Ok(ip) = entry.parse::<IpAddr>() {
            let target_type = match ip {
                IpAddr::V4(_) => TargetType::SingleIpv4,
                IpAddr::V6(_) if self.enable_ipv6 => TargetType::SingleIpv6,
                IpAddr::V6(_) => return Err(anyhow::anyhow!("IPv6 targets are disabled: {}", entry)),
            };
            return Ok(ParsedTarget {
                original: entry.to_string(),
                target_type,
                targets: vec![Target::new(ip.to_string())],
            });
        }

        if !is_valid_hostname(entry) {
            return Err(anyhow::anyhow!("Invalid target format: {}", entry));
        }

        Ok(ParsedTarget {
            original: entry.to_string(),
            target_type: TargetType::Hostname,
            targets: vec![Target::new(entry)],
        })
    }

    fn parse_cidr(&self, entry: &str) -> Result<ParsedTarget> {
        let network: IpNetwork = entry
            .parse()
            .with_context(|| format!("Invalid CIDR block: {}", entry))?;

        let (target_type, host_bits) = match network {
            IpNetwork::V4(net) => (TargetType::Ipv4Cidr, 32 - net.prefix() as u32),
            IpNetwork::V6(net) => {
                if !self.enable_ipv6 {
                    return Err(anyhow::anyhow!("IPv6 targets are disabled: {}", entry));
                }
                (TargetType::Ipv6Cidr, 128 - net.prefix() as u32)
            }
        };

        if host_bits >= 64 || (1u64 << host_bits) > self.max_cidr_addresses {
            return Err(anyhow::anyhow!(
                "CIDR network too large: {} (max: {} addresses)",
                entry,
                self.max_cidr_addresses
            ));
        }

        let targets = network.iter().map(|ip| Target::new(ip.to_string())).collect();

        Ok(ParsedTarget {
            original: entry.to_string(),
            target_type,
            targets,
        })
    }

    /// Validate target before parsing
    pub fn validate_target(&self, target: &str) -> Result<()> {
        let target = target.trim();

        if target.is_empty() {
            return Err(anyhow::anyhow!("Target cannot be empty"));
        }

        if target.chars().any(char::is_whitespace) {
            return Err(anyhow::anyhow!("Invalid characters in target: {}", target));
        }

        if target.len() > 253 {
            return Err(anyhow::anyhow!("Target too long (max 253 characters)"));
        }

        Ok(())
    }
}

/// DNS names and NetBIOS-style computer names
fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

/// Parse a comma-separated host list
pub fn parse_target_list(targets: &str, parser: &TargetParser) -> Result<Vec<ParsedTarget>> {
    let mut parsed_targets = Vec::new();

    for target in targets.split(',') {
        let target = target.trim();
        if !target.is_empty() {
            parsed_targets.push(parser.parse_target(target)?);
        }
    }

    Ok(parsed_targets)
}

/// Expand a set of raw entries (each possibly a comma list or CIDR block)
/// into targets, preserving order
pub fn expand_entries<S: AsRef<str>>(entries: &[S], parser: &TargetParser) -> Result<Vec<Target>> {
    let mut targets = Vec::new();
    for entry in entries {
        for parsed in parse_target_list(entry.as_ref(), parser)? {
            targets.extend(parsed.targets);
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_single_address() {
        let parser = TargetParser::default();
        let result = parser.parse_target("192.168.1.1").unwrap();

        assert_eq!(result.target_type, TargetType::SingleIpv4);
        assert_eq!(result.targets, vec![Target::from("192.168.1.1")]);
    }

    #[test]
    fn test_ipv6_single_address() {
        let parser = TargetParser::default();
        let result = parser.parse_target("2001:db8::1").unwrap();

        assert_eq!(result.target_type, TargetType::SingleIpv6);
        assert_eq!(result.targets.len(), 1);
    }

    #[test]
    fn test_hostname_kept_verbatim() {
        let parser = TargetParser::default();
        let result = parser.parse_target("WS01.corp.local").unwrap();
        assert_eq!(result.target_type, TargetType::Hostname);
        assert_eq!(result.targets, vec![Target::from("WS01.corp.local")]);

        let netbios = parser.parse_target("FILESRV_02").unwrap();
        assert_eq!(netbios.targets, vec![Target::from("FILESRV_02")]);
    }

    #[test]
    fn test_ipv4_cidr() {
        let parser = TargetParser::default();
        let result = parser.parse_target("192.168.1.0/30").unwrap();

        assert_eq!(result.target_type, TargetType::Ipv4Cidr);
        assert_eq!(
            result.targets,
            vec![
                Target::from("192.168.1.0"),
                Target::from("192.168.1.1"),
                Target::from("192.168.1.2"),
                Target::from("192.168.1.3"),
            ]
        );
    }

    #[test]
    fn test_ipv6_cidr() {
        let parser = TargetParser::default();
        let result = parser.parse_target("2001:db8::/126").unwrap();

        assert_eq!(result.target_type, TargetType::Ipv6Cidr);
        assert_eq!(result.targets.len(), 4);
    }

    #[test]
    fn test_invalid_target() {
        let parser = TargetParser::default();
        assert!(parser.parse_target("invalid..target").is_err());
        assert!(parser.parse_target("has space").is_err());
        assert!(parser.parse_target("").is_err());
        assert!(parser.parse_target("10.0.0.0/33").is_err());
    }

    #[test]
    fn test_cidr_too_large() {
        let parser = TargetParser::new(100, true);
        assert!(parser.parse_target("192.168.0.0/16").is_err());
        assert!(TargetParser::default().parse_target("2001:db8::/64").is_err());
    }

    #[test]
    fn test_ipv6_disabled() {
        let parser = TargetParser::new(1024, false);
        assert!(parser.parse_target("::1").is_err());
        assert!(parser.parse_target("2001:db8::/126").is_err());
    }

    #[test]
    fn test_expand_entries_preserves_order() {
        let parser = TargetParser::default();
        let entries = vec!["dc01,ws01", "10.0.0.0/31", "ws01"];
        let targets = expand_entries(&entries, &parser).unwrap();
        assert_eq!(
            targets,
            vec![
                Target::from("dc01"),
                Target::from("ws01"),
                Target::from("10.0.0.0"),
                Target::from("10.0.0.1"),
                Target::from("ws01"),
            ]
        );
    }
}
