mod common;

use std::fs;

use common::{read_cert, san_strings, Fixture};
use localtls::issuer::verify_chain;
use localtls::CaError;
use openssl::pkey::PKey;

#[test]
fn wildcard_covers_base_domain() {
    let fixture = Fixture::new();
    let issued = fixture.issuer().issue(&["*.local.test"]).unwrap();

    let cert = read_cert(&issued.cert_path());
    assert_eq!(san_strings(&cert), vec!["DNS:*.local.test", "DNS:local.test"]);
    assert_eq!(issued.identifier, "_.local.test");
}

#[test]
fn literal_ip_is_ip_san_only() {
    let fixture = Fixture::new();
    let issued = fixture.issuer().issue(&["127.0.0.1"]).unwrap();

    let cert = read_cert(&issued.cert_path());
    assert_eq!(san_strings(&cert), vec!["IP:127.0.0.1"]);
}

#[test]
fn mixed_domains_keep_order() {
    let fixture = Fixture::new();
    let issued = fixture
        .issuer()
        .issue(&["api.local", "localhost", "127.0.0.1"])
        .unwrap();

    let cert = read_cert(&issued.cert_path());
    assert_eq!(
        san_strings(&cert),
        vec!["DNS:api.local", "DNS:localhost", "IP:127.0.0.1"]
    );
    assert_eq!(issued.directory, fixture.paths.certs_dir.join("api.local"));
}

#[test]
fn issued_certificate_chains_to_ca() {
    let fixture = Fixture::new();
    let issuer = fixture.issuer();
    let ca = fixture.ca_manager.load().unwrap();

    for domains in [vec!["a.test"], vec!["*.b.test", "localhost"], vec!["::1"]] {
        let issued = issuer.issue(&domains).unwrap();
        let cert = read_cert(&issued.cert_path());
        verify_chain(ca.certificate(), &cert).unwrap();

        let key = PKey::private_key_from_pem(&fs::read(issued.key_path()).unwrap()).unwrap();
        assert!(cert.public_key().unwrap().public_eq(&key));
    }
}

#[test]
fn certificates_from_replaced_ca_no_longer_chain() {
    let fixture = Fixture::new();
    let issued = fixture.issuer().issue(&["old.test"]).unwrap();
    let old_leaf = read_cert(&issued.cert_path());

    fixture.ca_manager.generate().unwrap();
    let new_ca = fixture.ca_manager.load().unwrap();
    assert!(verify_chain(new_ca.certificate(), &old_leaf).is_err());
}

#[test]
fn issue_without_ca_is_not_found() {
    let fixture = Fixture::without_ca();
    let err = fixture.issuer().issue(&["a.test"]).unwrap_err();
    assert!(matches!(err, CaError::NotFound { .. }), "{err}");
}

#[test]
fn empty_domain_list_is_rejected() {
    let fixture = Fixture::new();
    let err = fixture.issuer().issue::<&str>(&[]).unwrap_err();
    assert!(matches!(err, CaError::InvalidDomain { .. }), "{err}");
}

#[test]
fn dot_only_domains_never_leave_certs_dir() {
    let fixture = Fixture::new();
    let root = fixture.dir.path();

    for domain in ["..", ".", "a..test", ".test"] {
        let err = fixture.issuer().issue(&[domain]).unwrap_err();
        assert!(matches!(err, CaError::InvalidDomain { .. }), "{domain}: {err}");
    }

    assert!(!root.join("cert.pem").exists());
    assert!(!root.join("key.pem").exists());
    assert!(!fixture.paths.certs_dir.exists());
    assert!(fixture.inventory().list().unwrap().is_empty());
}

#[test]
fn reissue_overwrites_in_place() {
    let fixture = Fixture::new();
    let issuer = fixture.issuer();
    issuer.issue(&["same.test", "extra.test"]).unwrap();
    let issued = issuer.issue(&["same.test"]).unwrap();

    let cert = read_cert(&issued.cert_path());
    assert_eq!(san_strings(&cert), vec!["DNS:same.test"]);
    let entries: Vec<_> = fs::read_dir(&issued.directory)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries.len(), 2, "{entries:?}");
}

#[cfg(unix)]
#[test]
fn leaf_key_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    let issued = fixture.issuer().issue(&["perm.test"]).unwrap();
    let mode = fs::metadata(issued.key_path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
