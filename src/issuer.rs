//! Certificate Issuer
//!
//! Signs a leaf certificate for an ordered list of domains and stores it under
//! `certs/<sanitize(primary)>/{cert.pem,key.pem}`. The first domain is the
//! primary one; it names the directory and becomes the subject CN.
//!
//! The issuer signs exactly the SAN set derived from its input. Callers that
//! want loopback coverage append `localhost` / `127.0.0.1` themselves.
//!
//! Before anything touches disk the new certificate is verified against the
//! CA and its key is checked against the certificate, so a failed signing
//! never replaces a previously good pair.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509};
use tracing::{debug, info};

use crate::ca_manager::CaManager;
use crate::configs::{LeafConfig, Paths};
use crate::domain_name::{sanitize, validate_domains};
use crate::error::{crypto, CaError, Result};
use crate::generate_leaf_cert::RsaLeafCertBuilder;
use crate::inventory::asn1_to_utc;
use crate::pem_file::{create_private_dir, StagedFile, PUBLIC_FILE_MODE, SECRET_FILE_MODE};

pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub primary_domain: String,
    pub domains: Vec<String>,
    /// Sanitized identifier, also the directory name.
    pub identifier: String,
    pub directory: PathBuf,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Hex-encoded serial number.
    pub serial: String,
}

impl IssuedCertificate {
    pub fn cert_path(&self) -> PathBuf {
        self.directory.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.directory.join(KEY_FILE)
    }
}

#[derive(Debug, Clone)]
pub struct CertificateIssuer {
    ca_manager: CaManager,
    certs_dir: PathBuf,
    settings: LeafConfig,
}

impl CertificateIssuer {
    pub fn new(ca_manager: CaManager, paths: &Paths, settings: LeafConfig) -> Self {
        Self {
            ca_manager,
            certs_dir: paths.certs_dir.clone(),
            settings,
        }
    }

    pub fn certs_dir(&self) -> &Path {
        &self.certs_dir
    }

    /// Issue (or re-issue) a certificate for `domains`.
    ///
    /// # Errors
    /// - `CaError::InvalidDomain` for an empty list or a malformed entry
    /// - `CaError::NotFound` when no CA exists
    /// - `CaError::Crypto` on key generation, signing or chain check failure
    /// - `CaError::Io` when the directory or files cannot be written
    pub fn issue<S: AsRef<str>>(&self, domains: &[S]) -> Result<IssuedCertificate> {
        validate_domains(domains)?;
        let domains: Vec<String> = domains.iter().map(|d| d.as_ref().to_string()).collect();
        let primary_domain = domains[0].clone();

        if !self.ca_manager.exists() {
            return Err(CaError::NotFound {
                what: "root CA",
                path: self.ca_manager.cert_path().to_path_buf(),
            });
        }
        let ca = self.ca_manager.load()?;
        let ca_key = ca.signing_key().to_pkey()?;

        let (private_key, certificate) = RsaLeafCertBuilder::new(&ca_key, ca.certificate())
            .domains(&domains)
            .organization(self.settings.organization.clone())
            .validity_days(self.settings.validity_days)
            .key_bits(self.settings.key_bits)
            .build()?;

        verify_issued(ca.certificate(), &certificate, &private_key)?;
        debug!(domain = %primary_domain, "leaf certificate verified against CA");

        let key_pem = private_key
            .private_key_to_pem_pkcs8()
            .map_err(crypto("encoding leaf private key as PEM"))?;
        let cert_pem = certificate
            .to_pem()
            .map_err(crypto("encoding leaf certificate as PEM"))?;

        let identifier = sanitize(&primary_domain);
        let directory = self.certs_dir.join(&identifier);
        create_private_dir(&directory)?;

        let staged_key = StagedFile::write(&directory.join(KEY_FILE), &key_pem, SECRET_FILE_MODE)?;
        let staged_cert =
            StagedFile::write(&directory.join(CERT_FILE), &cert_pem, PUBLIC_FILE_MODE)?;
        staged_key.commit()?;
        staged_cert.commit()?;

        let serial = certificate
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
            .map_err(crypto("reading serial number"))?;

        let issued = IssuedCertificate {
            not_before: asn1_to_utc(certificate.not_before())?,
            not_after: asn1_to_utc(certificate.not_after())?,
            primary_domain,
            domains,
            identifier,
            directory,
            serial,
        };

        info!(
            domain = %issued.primary_domain,
            sans = issued.domains.len(),
            dir = %issued.directory.display(),
            not_after = %issued.not_after,
            "issued certificate"
        );

        Ok(issued)
    }
}

/// Check that `leaf` chains to `ca` and that `key` belongs to `leaf`.
pub fn verify_issued(ca: &X509, leaf: &X509, key: &PKey<Private>) -> Result<()> {
    verify_chain(ca, leaf)?;

    let leaf_public = leaf
        .public_key()
        .map_err(crypto("reading leaf public key"))?;
    if !leaf_public.public_eq(key) {
        return Err(CaError::Crypto {
            context: "verifying issued certificate".to_string(),
            reason: "private key does not match certificate".to_string(),
        });
    }
    Ok(())
}

/// Verify `leaf` against a store holding only `ca`.
pub fn verify_chain(ca: &X509, leaf: &X509) -> Result<()> {
    let mut store_builder = X509StoreBuilder::new().map_err(crypto("creating X509 store"))?;
    store_builder
        .add_cert(ca.clone())
        .map_err(crypto("adding CA to X509 store"))?;
    let store = store_builder.build();

    let chain = Stack::new().map_err(crypto("creating certificate stack"))?;
    let mut context = X509StoreContext::new().map_err(crypto("creating verify context"))?;
    let failure = context
        .init(&store, leaf, &chain, |ctx| {
            Ok(if ctx.verify_cert()? {
                None
            } else {
                Some(ctx.error().error_string().to_string())
            })
        })
        .map_err(crypto("verifying certificate chain"))?;

    match failure {
        None => Ok(()),
        Some(reason) => Err(CaError::Crypto {
            context: "verifying certificate chain".to_string(),
            reason,
        }),
    }
}
