//! Domain Name Normalizer
//!
//! Turns a requested domain into the filesystem-safe identifier used as the
//! certificate's directory name under `certs/`, and derives the Subject
//! Alternative Name entries a leaf certificate carries for a domain list.
//!
//! # Identifier mapping
//! ```text
//! *.local.test   →  _.local.test      (wildcard marker)
//! api.local      →  api.local         (unchanged)
//! my site.test   →  my_site.test      (unsafe characters collapse to the marker)
//! ```
//!
//! # Known limitations
//! `unsanitize` only reverses the wildcard case. Any other character that was
//! collapsed to the marker cannot be recovered, so two different raw domains
//! can share one identifier (`a b.test` and `a_b.test`, or a raw domain that
//! itself starts with `_`). Renewal re-derives the domain from the identifier
//! and inherits this: an identifier starting with the marker is always
//! renewed as a wildcard.
//!
//! A literal IPv6 primary is caught by the same rule. `::1` becomes `__1`,
//! which counts as a wildcard identifier and renews as `*_1`, a domain that
//! fails validation and ends the renewal sweep.

use std::net::IpAddr;

use crate::error::{CaError, Result};

/// Character substituted for `*` and for every unsafe character.
pub const WILDCARD_MARKER: char = '_';

const WILDCARD_PREFIX: &str = "*.";

/// Map a domain specification to a path-safe identifier.
pub fn sanitize(domain: &str) -> String {
    domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                WILDCARD_MARKER
            }
        })
        .collect()
}

/// Restore a leading wildcard; every other identifier is returned unchanged.
pub fn unsanitize(identifier: &str) -> String {
    match identifier.strip_prefix(WILDCARD_MARKER) {
        Some(rest) => format!("*{}", rest),
        None => identifier.to_string(),
    }
}

/// True when `domain` requests wildcard coverage (`*.base`).
pub fn is_wildcard(domain: &str) -> bool {
    domain.starts_with(WILDCARD_PREFIX)
}

/// True when an on-disk identifier was produced from a wildcard domain.
pub fn is_wildcard_identifier(identifier: &str) -> bool {
    identifier.starts_with(WILDCARD_MARKER)
}

/// One Subject Alternative Name entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(IpAddr),
}

impl std::fmt::Display for SanEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanEntry::Dns(name) => write!(f, "DNS:{}", name),
            SanEntry::Ip(ip) => write!(f, "IP:{}", ip),
        }
    }
}

/// Derive SAN entries for `domains`, preserving order.
///
/// - a literal IP becomes an IP entry only
/// - `*.base` becomes `DNS:*.base` followed by `DNS:base`
/// - anything else becomes a plain DNS entry
pub fn san_entries<S: AsRef<str>>(domains: &[S]) -> Vec<SanEntry> {
    let mut entries = Vec::with_capacity(domains.len() + 1);
    for domain in domains {
        let domain = domain.as_ref();
        if let Ok(ip) = domain.parse::<IpAddr>() {
            entries.push(SanEntry::Ip(ip));
        } else if let Some(base) = domain.strip_prefix(WILDCARD_PREFIX) {
            entries.push(SanEntry::Dns(domain.to_string()));
            entries.push(SanEntry::Dns(base.to_string()));
        } else {
            entries.push(SanEntry::Dns(domain.to_string()));
        }
    }
    entries
}

/// Reject lists the issuer cannot turn into a certificate.
pub fn validate_domains<S: AsRef<str>>(domains: &[S]) -> Result<()> {
    if domains.is_empty() {
        return Err(CaError::InvalidDomain {
            domain: String::new(),
            reason: "at least one domain is required".to_string(),
        });
    }
    for domain in domains {
        let domain = domain.as_ref();
        let reason = if domain.trim().is_empty() {
            Some("domain is empty")
        } else if domain.chars().any(char::is_whitespace) {
            Some("domain contains whitespace")
        } else if domain.parse::<IpAddr>().is_err() && has_empty_label(domain) {
            Some("domain has an empty label")
        } else if domain == WILDCARD_PREFIX || domain == "*" {
            Some("wildcard has no base domain")
        } else if domain.chars().skip(1).any(|c| c == '*') {
            Some("only a single leading wildcard label is supported")
        } else if domain.starts_with('*') && !is_wildcard(domain) {
            Some("wildcard must be the whole leftmost label")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(CaError::InvalidDomain {
                domain: domain.to_string(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

/// Leading or trailing dot, or `..` anywhere. Covers `.` and `..`, which
/// would otherwise name a directory outside `certs/<identifier>/`.
fn has_empty_label(domain: &str) -> bool {
    domain.split('.').any(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_wildcard() {
        assert_eq!(sanitize("*.local.test"), "_.local.test");
        assert_eq!(sanitize("api.local"), "api.local");
        assert_eq!(sanitize("my site/x.test"), "my_site_x.test");
        assert_eq!(sanitize("127.0.0.1"), "127.0.0.1");
        assert_eq!(sanitize("::1"), "__1");
    }

    #[test]
    fn test_unsanitize_only_restores_wildcard() {
        assert_eq!(unsanitize("_.local.test"), "*.local.test");
        assert_eq!(unsanitize("api.local"), "api.local");
        assert_eq!(unsanitize("my_site.test"), "my_site.test");
    }

    #[test]
    fn test_round_trip_for_safe_domains() {
        for domain in [
            "localhost",
            "api.local",
            "*.local.test",
            "*.a-b.example.dev",
            "127.0.0.1",
            "x--y.test",
        ] {
            assert_eq!(unsanitize(&sanitize(domain)), domain);
        }
    }

    #[test]
    fn test_lossy_collision_is_preserved() {
        assert_eq!(sanitize("a b.test"), sanitize("a_b.test"));
    }

    #[test]
    fn test_san_entries_wildcard_adds_base() {
        assert_eq!(
            san_entries(&["*.local.test"]),
            vec![
                SanEntry::Dns("*.local.test".to_string()),
                SanEntry::Dns("local.test".to_string()),
            ]
        );
    }

    #[test]
    fn test_san_entries_ip_is_never_dns() {
        let entries = san_entries(&["api.local", "localhost", "127.0.0.1", "::1"]);
        assert_eq!(
            entries,
            vec![
                SanEntry::Dns("api.local".to_string()),
                SanEntry::Dns("localhost".to_string()),
                SanEntry::Ip("127.0.0.1".parse().unwrap()),
                SanEntry::Ip("::1".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn test_validate_domains() {
        assert!(validate_domains(&["*.local.test", "127.0.0.1"]).is_ok());
        assert!(validate_domains::<&str>(&[]).is_err());
        assert!(validate_domains(&[""]).is_err());
        assert!(validate_domains(&["*"]).is_err());
        assert!(validate_domains(&["a.*.test"]).is_err());
        assert!(validate_domains(&["*foo.test"]).is_err());
        assert!(validate_domains(&["a b.test"]).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_labels() {
        for domain in [".", "..", "...", ".local.test", "api.local.", "a..test", "*..test"] {
            assert!(
                matches!(validate_domains(&[domain]), Err(CaError::InvalidDomain { .. })),
                "{domain} should be rejected"
            );
        }
        assert!(validate_domains(&["::1", "fe80::1", "a.b.c"]).is_ok());
    }

    #[test]
    fn test_ipv6_identifier_reads_as_wildcard() {
        let identifier = sanitize("::1");
        assert!(is_wildcard_identifier(&identifier));
        assert_eq!(unsanitize(&identifier), "*_1");
        assert!(validate_domains(&[unsanitize(&identifier)]).is_err());
    }
}
