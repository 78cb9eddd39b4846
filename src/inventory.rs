//! Certificate Inventory & Renewal
//!
//! Enumerates `certs/*/cert.pem`, reports validity windows and re-issues
//! certificates that are about to expire.
//!
//! Entries that cannot be read or parsed are skipped so one corrupt
//! certificate does not hide the others. Records come back in filesystem
//! enumeration order; sort them if the order matters.
//!
//! # Known limitations
//! Renewal only knows the identifier, so a certificate issued for several
//! domains is re-issued for its primary domain alone. Wildcard coverage
//! survives because the SAN rule re-adds the base domain for `*.x`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::X509;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain_name::{is_wildcard_identifier, unsanitize};
use crate::error::{crypto, io_at, CaError, Result};
use crate::issuer::{CertificateIssuer, CERT_FILE};

/// Validity window of one stored certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub identifier: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub directory: PathBuf,
}

impl CertificateRecord {
    /// Domain reconstructed from the identifier.
    pub fn domain(&self) -> String {
        unsanitize(&self.identifier)
    }

    pub fn is_wildcard(&self) -> bool {
        is_wildcard_identifier(&self.identifier)
    }

    /// Whole days until expiry; negative once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }

    /// True when `not_after` is earlier than `now + threshold_days`.
    pub fn expires_within(&self, threshold_days: u32, now: DateTime<Utc>) -> bool {
        self.not_after < now + Duration::days(i64::from(threshold_days))
    }
}

#[derive(Debug, Clone)]
pub struct CertificateInventory {
    certs_dir: PathBuf,
    issuer: CertificateIssuer,
}

impl CertificateInventory {
    pub fn new(issuer: CertificateIssuer) -> Self {
        Self {
            certs_dir: issuer.certs_dir().to_path_buf(),
            issuer,
        }
    }

    /// Every parseable certificate under the certificates root.
    pub fn list(&self) -> Result<Vec<CertificateRecord>> {
        if !self.certs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let entries = fs::read_dir(&self.certs_dir).map_err(io_at(&self.certs_dir))?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let directory = entry.path();
            if !directory.is_dir() {
                continue;
            }
            match read_record(&directory) {
                Ok(record) => records.push(record),
                Err(e) => debug!(dir = %directory.display(), error = %e, "skipping certificate"),
            }
        }
        Ok(records)
    }

    /// Renew every certificate expiring within `threshold_days` from now.
    pub fn renew(&self, threshold_days: u32) -> Result<Vec<String>> {
        self.renew_at(threshold_days, Utc::now())
    }

    /// Renew relative to an explicit `now`. Returns the renewed domains.
    ///
    /// Stops at the first failure with `CaError::Renewal`, which lists the
    /// domains already renewed.
    pub fn renew_at(&self, threshold_days: u32, now: DateTime<Utc>) -> Result<Vec<String>> {
        let expiring: Vec<CertificateRecord> = self
            .list()?
            .into_iter()
            .filter(|record| record.expires_within(threshold_days, now))
            .collect();

        if expiring.is_empty() {
            debug!(threshold_days, "no certificates due for renewal");
            return Ok(Vec::new());
        }
        info!(count = expiring.len(), threshold_days, "renewing certificates");

        let mut renewed = Vec::with_capacity(expiring.len());
        for record in expiring {
            let domain = record.domain();
            if let Err(source) = self.issuer.issue(&[domain.as_str()]) {
                warn!(domain = %domain, error = %source, "renewal failed");
                return Err(CaError::Renewal {
                    renewed,
                    domain,
                    source: Box::new(source),
                });
            }
            info!(domain = %domain, "renewed certificate");
            renewed.push(domain);
        }
        Ok(renewed)
    }

    /// Number of stored wildcard certificates.
    pub fn count_wildcard_certs(&self) -> Result<usize> {
        Ok(self.list()?.iter().filter(|r| r.is_wildcard()).count())
    }
}

fn read_record(directory: &Path) -> Result<CertificateRecord> {
    let cert_path = directory.join(CERT_FILE);
    let pem = fs::read(&cert_path).map_err(io_at(&cert_path))?;
    let cert = X509::from_pem(&pem).map_err(|e| CaError::parse(&cert_path, e))?;

    let identifier = directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| CaError::parse(directory, "directory has no name"))?;

    Ok(CertificateRecord {
        identifier,
        not_before: asn1_to_utc(cert.not_before())?,
        not_after: asn1_to_utc(cert.not_after())?,
        directory: directory.to_path_buf(),
    })
}

/// Convert an ASN.1 time to UTC.
pub(crate) fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).map_err(crypto("creating epoch"))?;
    let diff = epoch
        .diff(time)
        .map_err(crypto("reading certificate time"))?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0).ok_or_else(|| CaError::Crypto {
        context: "reading certificate time".to_string(),
        reason: format!("timestamp {} out of range", secs),
    })
}
