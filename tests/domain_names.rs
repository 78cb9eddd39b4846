use localtls::domain_name::{san_entries, sanitize, unsanitize, SanEntry, WILDCARD_MARKER};

#[test]
fn round_trip_holds_for_safe_domains() {
    let labels = ["a", "dev", "my-app", "x1", "local", "test"];
    for first in labels {
        for second in labels {
            for prefix in ["", "*."] {
                let domain = format!("{prefix}{first}.{second}");
                assert_eq!(unsanitize(&sanitize(&domain)), domain);
            }
        }
    }
}

#[test]
fn identifiers_are_path_safe() {
    for domain in ["*.local.test", "we ird/name.test", "ünïcode.test", "a:b"] {
        let identifier = sanitize(domain);
        assert!(identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        assert!(!identifier.contains('/'));
    }
}

#[test]
fn wildcard_marker_starts_identifier() {
    assert!(sanitize("*.x.test").starts_with(WILDCARD_MARKER));
}

#[test]
fn each_entry_has_exactly_one_interpretation() {
    let entries = san_entries(&["10.0.0.1", "host.test"]);
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[0], SanEntry::Ip(_)));
    assert!(matches!(entries[1], SanEntry::Dns(ref d) if d == "host.test"));
}
