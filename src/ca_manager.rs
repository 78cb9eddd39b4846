//! CA Manager
//!
//! Owns the single root CA of an installation:
//!
//! ```text
//! <root>/ca/ca.crt   PEM certificate, 0644
//! <root>/ca/ca.key   PEM PKCS#8 private key, 0600
//! ```
//!
//! Both files exist or the CA is treated as absent. Generation writes both to
//! `.tmp` siblings before renaming either one into place, so an interrupted run
//! leaves the previous pair (or nothing) rather than a half-written file.
//!
//! Regenerating replaces the trust anchor. Leaf certificates signed by the
//! previous CA stop validating once the old CA is removed from trust stores;
//! callers are expected to warn the user before calling [`CaManager::generate`]
//! over an existing CA.
//!
//! Only [`PublicCaCertificate`] is handed to the trust store installer. It
//! carries the certificate path and subject name, never the key.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use secrecy::{ExposeSecret, Secret, Zeroize};
use tracing::{debug, info};

use crate::configs::{CaConfig, Paths};
use crate::error::{crypto, io_at, CaError, Result};
use crate::generate_root_ca::RsaRootCABuilder;
use crate::inventory::asn1_to_utc;
use crate::pem_file::{create_private_dir, StagedFile, PUBLIC_FILE_MODE, SECRET_FILE_MODE};

/// DER-encoded key material, zeroized on drop.
struct SecureKeyBytes {
    der_bytes: Vec<u8>,
}

impl Zeroize for SecureKeyBytes {
    fn zeroize(&mut self) {
        self.der_bytes.zeroize();
    }
}

/// In-memory holder for the CA private key
///
/// The key is kept as DER inside a [`Secret`] and only turned back into an
/// openssl key for the duration of a signing operation.
pub struct CaSigningKey {
    private_key: Secret<SecureKeyBytes>,
}

impl CaSigningKey {
    fn new(key: &PKey<Private>) -> Result<Self> {
        let der_bytes = key
            .private_key_to_der()
            .map_err(crypto("encoding CA private key"))?;
        Ok(Self {
            private_key: Secret::new(SecureKeyBytes { der_bytes }),
        })
    }

    /// Reconstruct the openssl key for signing.
    pub(crate) fn to_pkey(&self) -> Result<PKey<Private>> {
        PKey::private_key_from_der(&self.private_key.expose_secret().der_bytes)
            .map_err(crypto("reconstructing CA private key"))
    }
}

impl fmt::Debug for CaSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaSigningKey")
            .field("private_key", &"<securely stored>")
            .finish()
    }
}

/// A loaded root CA: certificate plus signing key.
#[derive(Debug)]
pub struct CertificateAuthority {
    certificate: X509,
    key: CaSigningKey,
}

impl CertificateAuthority {
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub(crate) fn signing_key(&self) -> &CaSigningKey {
        &self.key
    }

    pub fn common_name(&self) -> String {
        common_name_of(&self.certificate).unwrap_or_default()
    }

    pub fn not_before(&self) -> Result<DateTime<Utc>> {
        asn1_to_utc(self.certificate.not_before())
    }

    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        asn1_to_utc(self.certificate.not_after())
    }
}

/// The CA's public half as seen by the trust store installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicCaCertificate {
    pub path: PathBuf,
    pub common_name: String,
}

#[derive(Debug, Clone)]
pub struct CaManager {
    paths: Paths,
    settings: CaConfig,
}

impl CaManager {
    pub fn new(paths: Paths, settings: CaConfig) -> Self {
        Self { paths, settings }
    }

    pub fn cert_path(&self) -> &Path {
        &self.paths.ca_cert
    }

    /// True iff both the certificate and the key are present and readable.
    pub fn exists(&self) -> bool {
        readable_file(&self.paths.ca_cert) && readable_file(&self.paths.ca_key)
    }

    /// Generate a new root CA and persist it, replacing any existing one.
    pub fn generate(&self) -> Result<CertificateAuthority> {
        let (private_key, certificate) = RsaRootCABuilder::new()
            .subject_common_name(self.settings.common_name.clone())
            .organization(self.settings.organization.clone())
            .country(self.settings.country.clone())
            .validity_days(self.settings.validity_days)
            .key_bits(self.settings.key_bits)
            .build()?;

        let key_pem = private_key
            .private_key_to_pem_pkcs8()
            .map_err(crypto("encoding CA private key as PEM"))?;
        let cert_pem = certificate
            .to_pem()
            .map_err(crypto("encoding CA certificate as PEM"))?;

        create_private_dir(&self.paths.ca_dir)?;

        // Stage both before renaming either
        let staged_key = StagedFile::write(&self.paths.ca_key, &key_pem, SECRET_FILE_MODE)?;
        let staged_cert = StagedFile::write(&self.paths.ca_cert, &cert_pem, PUBLIC_FILE_MODE)?;
        staged_key.commit()?;
        staged_cert.commit()?;

        info!(
            cert = %self.paths.ca_cert.display(),
            common_name = %self.settings.common_name,
            validity_days = self.settings.validity_days,
            "generated root CA"
        );

        Ok(CertificateAuthority {
            key: CaSigningKey::new(&private_key)?,
            certificate,
        })
    }

    /// Load and cross-check the persisted CA.
    ///
    /// # Errors
    /// - `CaError::NotFound` if either file is missing
    /// - `CaError::Parse` if either file is malformed or the key does not
    ///   belong to the certificate
    pub fn load(&self) -> Result<CertificateAuthority> {
        let cert_pem = read_required(&self.paths.ca_cert, "CA certificate")?;
        let key_pem = read_required(&self.paths.ca_key, "CA private key")?;

        let certificate = X509::from_pem(&cert_pem)
            .map_err(|e| CaError::parse(&self.paths.ca_cert, e))?;
        let private_key = PKey::private_key_from_pem(&key_pem)
            .map_err(|e| CaError::parse(&self.paths.ca_key, e))?;

        let public_key = certificate
            .public_key()
            .map_err(|e| CaError::parse(&self.paths.ca_cert, e))?;
        if !public_key.public_eq(&private_key) {
            return Err(CaError::parse(
                &self.paths.ca_key,
                "private key does not match the CA certificate",
            ));
        }

        debug!(cert = %self.paths.ca_cert.display(), "loaded root CA");

        Ok(CertificateAuthority {
            key: CaSigningKey::new(&private_key)?,
            certificate,
        })
    }

    /// Load the CA, generating it first when absent. The flag reports whether
    /// a new CA was created.
    pub fn ensure(&self) -> Result<(CertificateAuthority, bool)> {
        if self.exists() {
            Ok((self.load()?, false))
        } else {
            Ok((self.generate()?, true))
        }
    }

    /// The public certificate handed to trust stores. Reads only `ca.crt`.
    pub fn public_certificate(&self) -> Result<PublicCaCertificate> {
        if !self.exists() {
            return Err(CaError::NotFound {
                what: "root CA",
                path: self.paths.ca_dir.clone(),
            });
        }
        let cert_pem = read_required(&self.paths.ca_cert, "CA certificate")?;
        let certificate = X509::from_pem(&cert_pem)
            .map_err(|e| CaError::parse(&self.paths.ca_cert, e))?;
        let common_name = common_name_of(&certificate)
            .unwrap_or_else(|| self.settings.common_name.clone());

        Ok(PublicCaCertificate {
            path: self.paths.ca_cert.clone(),
            common_name,
        })
    }
}

fn readable_file(path: &Path) -> bool {
    path.is_file() && fs::File::open(path).is_ok()
}

fn read_required(path: &Path, what: &'static str) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(CaError::NotFound {
            what,
            path: path.to_path_buf(),
        });
    }
    fs::read(path).map_err(io_at(path))
}

pub(crate) fn common_name_of(cert: &X509) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(root: &Path) -> CaManager {
        CaManager::new(Paths::new(root), CaConfig::default())
    }

    #[test]
    fn test_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(!manager.exists());

        let generated = manager.generate().unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap();
        assert_eq!(
            generated.certificate().to_der().unwrap(),
            loaded.certificate().to_der().unwrap()
        );
        assert_eq!(loaded.common_name(), "localtls Local Development CA");

        let key = loaded.signing_key().to_pkey().unwrap();
        assert!(loaded.certificate().verify(&key).unwrap());
    }

    #[test]
    fn test_validity_is_ten_years() {
        let dir = tempfile::tempdir().unwrap();
        let ca = manager(dir.path()).generate().unwrap();
        let days = (ca.not_after().unwrap() - ca.not_before().unwrap()).num_days();
        assert_eq!(days, 3650);
    }

    #[test]
    fn test_lone_file_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.generate().unwrap();
        fs::remove_file(dir.path().join("ca").join("ca.key")).unwrap();

        assert!(!manager.exists());
        assert!(matches!(
            manager.load(),
            Err(CaError::NotFound { what: "CA private key", .. })
        ));
        assert!(matches!(
            manager.public_certificate(),
            Err(CaError::NotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_cert_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.generate().unwrap();
        fs::write(dir.path().join("ca").join("ca.crt"), b"not a certificate").unwrap();

        assert!(manager.exists());
        assert!(matches!(manager.load(), Err(CaError::Parse { .. })));
    }

    #[test]
    fn test_mismatched_key_is_parse_error() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        manager(first.path()).generate().unwrap();
        manager(second.path()).generate().unwrap();
        fs::copy(
            second.path().join("ca").join("ca.key"),
            first.path().join("ca").join("ca.key"),
        )
        .unwrap();

        assert!(matches!(
            manager(first.path()).load(),
            Err(CaError::Parse { .. })
        ));
    }

    #[test]
    fn test_ensure_reuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let (_, created) = manager.ensure().unwrap();
        assert!(created);
        let (_, created) = manager.ensure().unwrap();
        assert!(!created);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        manager(dir.path()).generate().unwrap();

        let key_mode = fs::metadata(dir.path().join("ca").join("ca.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(key_mode & 0o777, 0o600);
        let dir_mode = fs::metadata(dir.path().join("ca"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn test_public_certificate_carries_no_key() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.generate().unwrap();

        let public = manager.public_certificate().unwrap();
        assert_eq!(public.path, dir.path().join("ca").join("ca.crt"));
        assert_eq!(public.common_name, "localtls Local Development CA");
    }

    #[test]
    fn test_debug_no_leak() {
        let dir = tempfile::tempdir().unwrap();
        let ca = manager(dir.path()).generate().unwrap();

        let debug_str = format!("{:?}", ca);
        assert!(!debug_str.contains("der_bytes"));
        assert!(debug_str.contains("securely stored"));
    }
}
