//! localtls - Local Development Certificate Authority
//!
//! Runs a private CA on the developer's machine, issues leaf certificates for
//! local domains (wildcards and literal IPs included) and installs the CA into
//! the OS and browser trust stores so those certificates are accepted.
//!
//! # Overview
//!
//! ```text
//! CaManager ──ensure CA──▶ CertificateIssuer ──cert.pem/key.pem──▶ certs/<identifier>/
//!     │                          ▲
//!     │                          └── CertificateInventory (list, renew)
//!     └── PublicCaCertificate ──▶ TrustInstaller (system, Chromium NSS, Firefox NSS)
//! ```
//!
//! # Layout
//!
//! ```text
//! <root>/ca/ca.crt                     root certificate (0644)
//! <root>/ca/ca.key                     root private key (0600)
//! <root>/certs/<identifier>/cert.pem   leaf certificate
//! <root>/certs/<identifier>/key.pem    leaf private key
//! ```
//!
//! The root is resolved once by [`configs::Paths::resolve`] and passed into
//! every component, so tests can point the whole engine at a temporary
//! directory.
//!
//! # Example
//!
//! ```no_run
//! use localtls::{CaManager, CertificateIssuer};
//! use localtls::configs::{AppConfig, Paths};
//!
//! fn main() -> localtls::Result<()> {
//!     let config = AppConfig::default();
//!     let paths = Paths::new("/tmp/localtls");
//!     let ca_manager = CaManager::new(paths.clone(), config.ca.clone());
//!     ca_manager.ensure()?;
//!
//!     let issuer = CertificateIssuer::new(ca_manager, &paths, config.leaf.clone());
//!     let issued = issuer.issue(&["*.local.test", "localhost", "127.0.0.1"])?;
//!     println!("certificate written to {}", issued.directory.display());
//!     Ok(())
//! }
//! ```

pub mod ca_manager;
pub mod configs;
pub mod doctor;
pub mod domain_name;
pub mod error;
mod generate_leaf_cert;
mod generate_root_ca;
pub mod inventory;
pub mod issuer;
pub mod license;
pub mod logging;
mod pem_file;
pub mod setup;
pub mod trust;

pub use ca_manager::{CaManager, CertificateAuthority, PublicCaCertificate};
pub use error::{CaError, Result};
pub use inventory::{CertificateInventory, CertificateRecord};
pub use issuer::{CertificateIssuer, IssuedCertificate};
pub use trust::{InstallReport, TargetState, TrustContext, TrustInstaller, TrustTarget};
