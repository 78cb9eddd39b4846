//! Root CA Certificate Generation Module
//!
//! Generates the self-signed certificate and RSA key that act as the local
//! development trust anchor. Every leaf certificate issued on this machine is
//! signed directly by this root.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Key Usage** (critical): digitalSignature, keyCertSign, cRLSign
//! - **Extended Key Usage**: clientAuth, serverAuth
//! - **Basic Constraints** (critical): CA=true, pathlen=1
//! - **Default Key Size**: RSA 2048-bit
//! - **Default Validity**: 3650 days
//! - **Version**: X.509v3 with a Subject Key Identifier
//!
//! # Example
//! ```rust,ignore
//! let (root_key, root_cert) = RsaRootCABuilder::new()
//!     .subject_common_name("localtls Local Development CA".to_string())
//!     .organization("localtls Local CA".to_string())
//!     .country("US".to_string())
//!     .validity_days(3650)
//!     .build()?;
//! ```

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509};

use crate::configs::MIN_RSA_KEY_BITS;
use crate::error::{crypto, CaError, Result};

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub(crate) const RSA_KEY_SIZE_DEFAULT: u32 = 2048;
pub(crate) const SERIAL_NUMBER_BITS: i32 = 128;
const ROOT_CA_PATH_LENGTH: u32 = 1;

/// Random 128-bit serial number shared by root and leaf builders.
pub(crate) fn random_serial() -> Result<openssl::asn1::Asn1Integer> {
    let mut serial = BigNum::new().map_err(crypto("allocating serial number"))?;
    serial
        .rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)
        .map_err(crypto("generating serial number"))?;
    serial
        .to_asn1_integer()
        .map_err(crypto("encoding serial number"))
}

/// Fresh RSA key of `bits` bits, refusing anything weaker than 2048.
pub(crate) fn generate_rsa_key(bits: u32) -> Result<PKey<Private>> {
    if bits < MIN_RSA_KEY_BITS {
        return Err(CaError::Config(format!(
            "RSA key size {} is below the {}-bit minimum",
            bits, MIN_RSA_KEY_BITS
        )));
    }
    let rsa = Rsa::generate(bits).map_err(crypto("generating RSA keypair"))?;
    PKey::from_rsa(rsa).map_err(crypto("wrapping RSA keypair"))
}

// ================= RSA Key and Certificate Builder =================

/// Builder for the RSA key pair and self-signed root CA certificate
///
/// `subject_common_name` is required. Organization and country are added to
/// the subject when set.
pub(crate) struct RsaRootCABuilder {
    subject_common_name: String,
    organization: String,
    country: String,
    validity_days: u32,
    key_bits: u32,
}

impl RsaRootCABuilder {
    /// Create a new builder with a 10 year validity and a 2048-bit key
    pub(crate) fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            organization: String::new(),
            country: String::new(),
            validity_days: 3650,
            key_bits: RSA_KEY_SIZE_DEFAULT,
        }
    }

    /// Set the common name (CN) for the certificate
    ///
    /// The trust store installer looks the CA up by this name, so it should be
    /// unique to this tool.
    pub(crate) fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set the organization (O) for the certificate
    pub(crate) fn organization(mut self, org: String) -> Self {
        self.organization = org;
        self
    }

    /// Set the country (C) for the certificate (2-letter ISO code)
    pub(crate) fn country(mut self, country: String) -> Self {
        self.country = country;
        self
    }

    /// Set validity period in days
    pub(crate) fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub(crate) fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    /// Build the RSA key pair and self-signed root CA certificate
    ///
    /// # Errors
    /// - `CaError::Config` if the common name is empty or the key size is too small
    /// - `CaError::Crypto` if key generation, extension encoding or signing fails
    pub(crate) fn build(self) -> Result<(PKey<Private>, X509)> {
        if self.subject_common_name.is_empty() {
            return Err(CaError::Config(
                "root CA common name must not be empty".to_string(),
            ));
        }

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
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &self.subject_common_name)
            .map_err(crypto("setting CN"))?;
        if !self.organization.is_empty() {
            name_builder
                .append_entry_by_nid(Nid::ORGANIZATIONNAME, &self.organization)
                .map_err(crypto("setting organization"))?;
        }
        if !self.country.is_empty() {
            name_builder
                .append_entry_by_nid(Nid::COUNTRYNAME, &self.country)
                .map_err(crypto("setting country"))?;
        }
        let name = name_builder.build();

        builder
            .set_subject_name(&name)
            .map_err(crypto("setting subject"))?;
        builder
            .set_issuer_name(&name)
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
            .ca()
            .pathlen(ROOT_CA_PATH_LENGTH)
            .build()
            .map_err(crypto("building BasicConstraints"))?;
        builder
            .append_extension(basic_constraints)
            .map_err(crypto("adding BasicConstraints"))?;

        let key_usage = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_cert_sign()
            .crl_sign()
            .build()
            .map_err(crypto("building KeyUsage"))?;
        builder
            .append_extension(key_usage)
            .map_err(crypto("adding KeyUsage"))?;

        let extended_key_usage = ExtendedKeyUsage::new()
            .client_auth()
            .server_auth()
            .build()
            .map_err(crypto("building ExtendedKeyUsage"))?;
        builder
            .append_extension(extended_key_usage)
            .map_err(crypto("adding ExtendedKeyUsage"))?;

        let subject_key_id = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .map_err(crypto("building SubjectKeyIdentifier"))?;
        builder
            .append_extension(subject_key_id)
            .map_err(crypto("adding SubjectKeyIdentifier"))?;

        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(crypto("signing root certificate"))?;

        Ok((private_key, builder.build()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_root() -> (PKey<Private>, X509) {
        RsaRootCABuilder::new()
            .subject_common_name("Test Local CA".to_string())
            .organization("Test Org".to_string())
            .country("US".to_string())
            .validity_days(30)
            .build()
            .unwrap()
    }

    #[test]
    fn test_root_is_self_signed_ca() {
        let (key, cert) = build_test_root();

        assert!(cert.verify(&key).unwrap());
        assert!(cert.public_key().unwrap().public_eq(&key));

        let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
        assert!(text.contains("CA:TRUE"), "{text}");
        assert!(text.contains("pathlen:1"), "{text}");
        assert!(text.contains("Certificate Sign"), "{text}");
        assert!(text.contains("CRL Sign"), "{text}");
        assert!(text.contains("TLS Web Server Authentication"), "{text}");
        assert!(text.contains("TLS Web Client Authentication"), "{text}");
    }

    #[test]
    fn test_subject_matches_issuer() {
        let (_, cert) = build_test_root();
        let cn = |name: &openssl::x509::X509NameRef| {
            name.entries_by_nid(Nid::COMMONNAME)
                .next()
                .unwrap()
                .data()
                .as_utf8()
                .unwrap()
                .to_string()
        };
        assert_eq!(cn(cert.subject_name()), "Test Local CA");
        assert_eq!(cn(cert.issuer_name()), "Test Local CA");
    }

    #[test]
    fn test_weak_key_rejected() {
        let result = RsaRootCABuilder::new()
            .subject_common_name("Weak".to_string())
            .key_bits(1024)
            .build();
        assert!(matches!(result, Err(CaError::Config(_))));
    }

    #[test]
    fn test_empty_common_name_rejected() {
        assert!(RsaRootCABuilder::new().build().is_err());
    }

    #[test]
    fn test_serials_differ() {
        let (_, a) = build_test_root();
        let (_, b) = build_test_root();
        assert_ne!(
            a.serial_number().to_bn().unwrap(),
            b.serial_number().to_bn().unwrap()
        );
    }
}
