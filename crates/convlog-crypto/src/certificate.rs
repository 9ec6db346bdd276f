//! Account and device certificates.
//!
//! An account certificate is self-issued: its id (the fingerprint of its key)
//! is the member uri. A device certificate is issued by the account key, so
//! its issuer uid is the uri of the member owning the device. Both carry an
//! expiry checked against commit timestamps.

use serde::{Deserialize, Serialize};

use crate::signer::{fingerprint, Signature, SignatureError, SigningKey, VerifyingKey};

/// Errors from decoding or checking a certificate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CertificateError {
    #[error("malformed certificate: {0}")]
    Malformed(String),
    #[error("certificate key error: {0}")]
    Key(#[from] SignatureError),
}

/// A signed binding of a public key to an issuer key and an expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Display name of the subject.
    pub name: String,
    /// Hex-encoded subject public key.
    pub public_key: String,
    /// Hex-encoded issuer public key. Equal to `public_key` when self-issued.
    pub issuer_key: String,
    /// Unix timestamp (seconds) after which the certificate is expired.
    pub not_after: i64,
    pub signature: Signature,
}

#[derive(Serialize)]
struct Payload<'a> {
    name: &'a str,
    public_key: &'a str,
    issuer_key: &'a str,
    not_after: i64,
}

impl Certificate {
    /// Issue a self-signed certificate (account certificate).
    pub fn issue_self(key: &SigningKey, name: impl Into<String>, not_after: i64) -> Self {
        Self::issue(&key.verifying_key(), key, name, not_after)
    }

    /// Issue a certificate for `subject`, signed by `issuer`.
    pub fn issue(
        subject: &VerifyingKey,
        issuer: &SigningKey,
        name: impl Into<String>,
        not_after: i64,
    ) -> Self {
        let name = name.into();
        let public_key = subject.to_hex();
        let issuer_key = issuer.verifying_key().to_hex();
        let payload = signing_payload(&name, &public_key, &issuer_key, not_after);
        let signature = issuer.sign(&payload);
        Self {
            name,
            public_key,
            issuer_key,
            not_after,
            signature,
        }
    }

    /// Fingerprint of the subject key.
    pub fn id(&self) -> String {
        self.subject_key()
            .map(|k| k.fingerprint())
            .unwrap_or_default()
    }

    /// Fingerprint of the issuer key.
    pub fn issuer_uid(&self) -> String {
        VerifyingKey::from_hex(&self.issuer_key)
            .map(|k| fingerprint(&k.as_bytes()))
            .unwrap_or_default()
    }

    pub fn is_self_issued(&self) -> bool {
        self.public_key == self.issuer_key
    }

    pub fn subject_key(&self) -> Result<VerifyingKey, CertificateError> {
        Ok(VerifyingKey::from_hex(&self.public_key)?)
    }

    /// Check the issuer signature over the certificate fields.
    pub fn verify_signature(&self) -> Result<(), CertificateError> {
        let issuer = VerifyingKey::from_hex(&self.issuer_key)?;
        let payload =
            signing_payload(&self.name, &self.public_key, &self.issuer_key, self.not_after);
        issuer.verify(&payload, &self.signature)?;
        Ok(())
    }

    /// `true` once `timestamp` is past the expiry.
    pub fn is_expired_at(&self, timestamp: i64) -> bool {
        timestamp > self.not_after
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CertificateError> {
        serde_json::from_slice(data).map_err(|e| CertificateError::Malformed(e.to_string()))
    }
}

fn signing_payload(name: &str, public_key: &str, issuer_key: &str, not_after: i64) -> Vec<u8> {
    serde_json::to_vec(&Payload {
        name,
        public_key,
        issuer_key,
        not_after,
    })
    .unwrap_or_default()
}

/// Check a certificate file found in a conversation tree against `uri`.
///
/// A self-issued certificate must have `uri` as its id; an issued (device)
/// certificate must have `uri` as its issuer. When `previous` is given the
/// certificate is a renewal and must keep the same subject.
pub fn verify_certificate(data: &[u8], uri: &str, previous: Option<&[u8]>) -> bool {
    let Ok(cert) = Certificate::from_bytes(data) else {
        return false;
    };
    if cert.verify_signature().is_err() {
        return false;
    }
    if let Some(previous) = previous {
        match Certificate::from_bytes(previous) {
            Ok(old) if old.id() == cert.id() => {}
            _ => return false,
        }
    }
    if cert.is_self_issued() {
        cert.id() == uri
    } else {
        cert.issuer_uid() == uri
    }
}
