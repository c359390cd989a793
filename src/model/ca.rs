//! # Cluster CA
//!
//! Read-only snapshot of the cluster certificate authority and issuing of the
//! manager client certificates.
//!
//! The CA itself is owned by the cluster reconciler. Its certificate and key live in
//! two Secrets annotated with their rotation generation. Each CA key replacement bumps
//! the key generation, each certificate renewal bumps the certificate generation.

use crate::constants::{ANNO_CLUSTER_CA_CERT_GENERATION, ANNO_CLUSTER_CA_KEY_GENERATION};
use crate::error::{EntityOperatorError, Result};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};

/// Key of the current CA certificate in the CA cert Secret
pub const CA_CERT_KEY: &str = "ca.crt";

/// Key of the CA private key in the CA key Secret
pub const CA_KEY_KEY: &str = "ca.key";

/// Snapshot of the cluster CA for one reconciliation
#[derive(Clone)]
pub struct ClusterCa {
    cert_pem: String,
    key_pem: String,
    cert_generation: i64,
    key_generation: i64,
    certs_removed: bool,
}

impl std::fmt::Debug for ClusterCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCa")
            .field("cert_generation", &self.cert_generation)
            .field("key_generation", &self.key_generation)
            .field("certs_removed", &self.certs_removed)
            .finish_non_exhaustive()
    }
}

/// A freshly issued leaf certificate and its private key
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

impl ClusterCa {
    pub fn new(
        cert_pem: impl Into<String>,
        key_pem: impl Into<String>,
        cert_generation: i64,
        key_generation: i64,
    ) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
            cert_generation,
            key_generation,
            certs_removed: false,
        }
    }

    /// Mark that expired CA certificates were removed during this reconciliation
    ///
    /// Running pods may still trust the removed certificates, so they must be restarted
    /// even when nothing else changed.
    #[must_use]
    pub fn with_certs_removed(mut self, certs_removed: bool) -> Self {
        self.certs_removed = certs_removed;
        self
    }

    /// Load the CA from the cluster CA cert and key Secrets
    ///
    /// Missing generation annotations count as generation 0.
    pub fn from_secrets(cert_secret: &Secret, key_secret: &Secret) -> Result<Self> {
        let cert_pem = secret_entry(cert_secret, CA_CERT_KEY)?;
        let key_pem = secret_entry(key_secret, CA_KEY_KEY)?;
        Ok(Self::new(
            cert_pem,
            key_pem,
            generation(cert_secret, ANNO_CLUSTER_CA_CERT_GENERATION)?,
            generation(key_secret, ANNO_CLUSTER_CA_KEY_GENERATION)?,
        ))
    }

    /// Create a self-signed CA, valid for `validity` from `now`
    ///
    /// Used for local clusters and tests, production CAs are loaded with `from_secrets`.
    pub fn self_signed(
        common_name: &str,
        now: DateTime<Utc>,
        validity: Duration,
        cert_generation: i64,
        key_generation: i64,
    ) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = to_offset(now)?;
        params.not_after = to_offset(now + validity)?;

        let key = KeyPair::generate()
            .map_err(|e| EntityOperatorError::Certificate(format!("failed to generate CA key: {e}")))?;
        let cert = params
            .self_signed(&key)
            .map_err(|e| EntityOperatorError::Certificate(format!("failed to create CA cert: {e}")))?;

        Ok(Self::new(
            cert.pem(),
            key.serialize_pem(),
            cert_generation,
            key_generation,
        ))
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn cert_generation(&self) -> i64 {
        self.cert_generation
    }

    pub fn key_generation(&self) -> i64 {
        self.key_generation
    }

    pub fn certs_removed(&self) -> bool {
        self.certs_removed
    }

    /// Issue a client certificate for `common_name`, signed by this CA
    pub fn issue(
        &self,
        common_name: &str,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Result<IssuedCertificate> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        params.not_before = to_offset(now)?;
        params.not_after = to_offset(now + validity)?;

        let leaf_key = KeyPair::generate().map_err(|e| {
            EntityOperatorError::Certificate(format!("failed to generate key for {common_name}: {e}"))
        })?;

        let ca_key = KeyPair::from_pem(&self.key_pem)
            .map_err(|e| EntityOperatorError::Certificate(format!("failed to load CA key: {e}")))?;
        let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, &ca_key)
            .map_err(|e| EntityOperatorError::Certificate(format!("failed to load CA cert: {e}")))?;

        let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
            EntityOperatorError::Certificate(format!("failed to sign certificate for {common_name}: {e}"))
        })?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }
}

/// Whether a PEM certificate expires within `window` of `now`
pub fn certificate_expires_within(
    cert_pem: &[u8],
    now: DateTime<Utc>,
    window: Duration,
) -> Result<bool> {
    Ok(not_after(cert_pem)? <= (now + window).timestamp())
}

/// Remove expired historical CA certificates (`ca-*.crt`) from the CA cert Secret
///
/// Returns the pruned Secret, or None when nothing expired. The current `ca.crt` is
/// never pruned. Entries that cannot be parsed are left alone.
pub fn prune_expired_ca_certs(cert_secret: &Secret, now: DateTime<Utc>) -> Option<Secret> {
    let data = cert_secret.data.as_ref()?;
    let expired: Vec<String> = data
        .iter()
        .filter(|(key, _)| key.starts_with("ca-") && key.ends_with(".crt"))
        .filter(|(_, value)| matches!(not_after(&value.0), Ok(t) if t <= now.timestamp()))
        .map(|(key, _)| key.clone())
        .collect();

    if expired.is_empty() {
        return None;
    }

    let mut pruned = cert_secret.clone();
    if let Some(data) = pruned.data.as_mut() {
        for key in &expired {
            data.remove(key);
        }
    }
    Some(pruned)
}

fn not_after(cert_pem: &[u8]) -> Result<i64> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem)
        .map_err(|e| EntityOperatorError::Certificate(format!("failed to parse PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| EntityOperatorError::Certificate(format!("failed to parse certificate: {e}")))?;
    Ok(cert.validity().not_after.timestamp())
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String("io.streamhub".to_string()),
    );
    dn
}

fn to_offset(instant: DateTime<Utc>) -> Result<::time::OffsetDateTime> {
    ::time::OffsetDateTime::from_unix_timestamp(instant.timestamp())
        .map_err(|e| EntityOperatorError::Certificate(format!("invalid validity bound: {e}")))
}

fn secret_entry(secret: &Secret, key: &str) -> Result<String> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| EntityOperatorError::Certificate(format!("Secret {name} has no {key}")))?;
    String::from_utf8(value.0.clone())
        .map_err(|_| EntityOperatorError::Certificate(format!("{key} of Secret {name} is not UTF-8")))
}

fn generation(secret: &Secret, annotation: &str) -> Result<i64> {
    match secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotation))
    {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| {
            EntityOperatorError::Certificate(format!("annotation {annotation} is not a number: {value}"))
        }),
    }
}

/// PEM text as Secret data
pub(crate) fn byte_string(pem: &str) -> ByteString {
    ByteString(pem.as_bytes().to_vec())
}
