//! Leaf (end-entity) TLS certificate generation
//!
//! Creates a server certificate for a list of domains, signed directly by the
//! local root CA:
//!
//! **Certificate Chain**: Root CA → Leaf Certificate
//!
//! # X.509 Extensions
//! - **Basic Constraints** (critical): CA=false
//! - **Key Usage** (critical): `digitalSignature`, `keyEncipherment`
//! - **Extended Key Usage**: `serverAuth`
//! - **Subject Alternative Name**: derived from the domain list by
//!   [`san_entries`](crate::domain_name::san_entries)
//! - **Subject / Authority Key Identifier**

use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509Ref, X509};

use crate::domain_name::{san_entries, validate_domains, SanEntry};
use crate::error::{crypto, Result};
use crate::generate_root_ca::{
    generate_rsa_key, random_serial, RSA_KEY_SIZE_DEFAULT, X509_VERSION_3,
};

/// Longest value X.520 allows for a common name.
const MAX_COMMON_NAME_LEN: usize = 64;

/// Builder for a fresh RSA key pair and a leaf certificate signed by the CA
///
/// A new key is generated on every `build()`; keys are never reused.
pub(crate) struct RsaLeafCertBuilder<'a> {
    domains: Vec<String>,
    organization: String,
    validity_days: u32,
    key_bits: u32,
    signing_key: &'a PKeyRef<Private>,
    signing_cert: &'a X509Ref,
}

impl<'a> RsaLeafCertBuilder<'a> {
    pub(crate) fn new(ca_key: &'a PKeyRef<Private>, ca_cert: &'a X509Ref) -> Self {
        Self {
            domains: Vec::new(),
            organization: String::new(),
            validity_days: 365,
            key_bits: RSA_KEY_SIZE_DEFAULT,
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    /// Domains the certificate covers; the first one becomes the subject CN.
    pub(crate) fn domains<S: AsRef<str>>(mut self, domains: &[S]) -> Self {
        self.domains = domains.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub(crate) fn organization(mut self, org: String) -> Self {
        self.organization = org;
        self
    }

    pub(crate) fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub(crate) fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    /// Build the key pair and signed certificate
    ///
    /// # Errors
    /// - `CaError::InvalidDomain` for an empty or malformed domain list
    /// - `CaError::Crypto` if key generation, SAN encoding or signing fails
    pub(crate) fn build(self) -> Result<(PKey<Private>, X509)> {
        validate_domains(&self.domains)?;

        let private_key = generate_rsa_key(self.key_bits)?;

        let mut builder = X509::builder().map_err(crypto("creating X509 builder"))?;
        builder
            .set_version(X509_VERSION_3)
            .map_err(crypto("setting version"))?;

        let serial = random_serial()?;
        builder
            .set_serial_number(&serial)
            .map_err(crypto("setting serial number"))?;

        let mut name_builder = X509Name::builder().map_err(crypto("creating name builder"))?;
        if !self.organization.is_empty() {
            name_builder
                .append_entry_by_nid(Nid::ORGANIZATIONNAME, &self.organization)
                .map_err(crypto("setting organization"))?;
        }
        // Longer names are still covered by the SAN extension
        let primary = &self.domains[0];
        if primary.len() <= MAX_COMMON_NAME_LEN {
            name_builder
                .append_entry_by_nid(Nid::COMMONNAME, primary)
                .map_err(crypto("setting CN"))?;
        }
        let name = name_builder.build();
        builder
            .set_subject_name(&name)
            .map_err(crypto("setting subject"))?;
        builder
            .set_issuer_name(self.signing_cert.subject_name())
            .map_err(crypto("setting issuer"))?;

        let not_before = Asn1Time::days_from_now(0).map_err(crypto("creating not_before"))?;
        builder
            .set_not_before(&not_before)
            .map_err(crypto("setting not_before"))?;
        let not_after =
            Asn1Time::days_from_now(self.validity_days).map_err(crypto("creating not_after"))?;
        builder
            .set_not_after(&not_after)
            .map_err(crypto("setting not_after"))?;

        builder
            .set_pubkey(&private_key)
            .map_err(crypto("setting public key"))?;

        let basic_constraints = BasicConstraints::new()
            .critical()
            .build()
            .map_err(crypto("building BasicConstraints"))?;
        builder
            .append_extension(basic_constraints)
            .map_err(crypto("adding BasicConstraints"))?;

        let key_usage = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()
            .map_err(crypto("building KeyUsage"))?;
        builder
            .append_extension(key_usage)
            .map_err(crypto("adding KeyUsage"))?;

        let extended_key_usage = ExtendedKeyUsage::new()
            .server_auth()
            .build()
            .map_err(crypto("building ExtendedKeyUsage"))?;
        builder
            .append_extension(extended_key_usage)
            .map_err(crypto("adding ExtendedKeyUsage"))?;

        let mut san = SubjectAlternativeName::new();
        for entry in san_entries(&self.domains) {
            match entry {
                SanEntry::Dns(name) => san.dns(&name),
                SanEntry::Ip(ip) => san.ip(&ip.to_string()),
            };
        }
        let san_extension = san
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(crypto("building SubjectAlternativeName"))?;
        builder
            .append_extension(san_extension)
            .map_err(crypto("adding SubjectAlternativeName"))?;

        let subject_key_id = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(crypto("building SubjectKeyIdentifier"))?;
        builder
            .append_extension(subject_key_id)
            .map_err(crypto("adding SubjectKeyIdentifier"))?;

        let authority_key_id = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(crypto("building AuthorityKeyIdentifier"))?;
        builder
            .append_extension(authority_key_id)
            .map_err(crypto("adding AuthorityKeyIdentifier"))?;

        builder
            .sign(self.signing_key, MessageDigest::sha256())
            .map_err(crypto("signing leaf certificate"))?;

        Ok((private_key, builder.build()))
    }
}
