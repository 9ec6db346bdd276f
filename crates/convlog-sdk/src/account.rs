//! The identity a conversation acts as.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};

use convlog_crypto::{Certificate, Signature, SigningKey};

/// Signing identity of the local device.
///
/// A conversation never sees private keys; it asks the account to sign
/// commit payloads and to vouch for certificates of other devices.
pub trait Account: Send + Sync {
    /// Member uri: fingerprint of the account key.
    fn uri(&self) -> String;

    /// Fingerprint of the local device key.
    fn device_id(&self) -> String;

    fn display_name(&self) -> String;

    /// Sign `data` with the device key.
    fn sign(&self, data: &[u8]) -> Signature;

    /// Self-issued account certificate.
    fn account_certificate(&self) -> Certificate;

    /// Certificate of the local device, issued by the account key.
    fn device_certificate(&self) -> Certificate;

    /// Certificate of any device this account has heard of.
    fn certificate_for(&self, device: &str) -> Option<Certificate>;

    fn is_valid_device(&self, cert: &Certificate) -> bool;

    /// Revocation list published at `CRLs/<uri>`, if the account has one.
    fn revocation_list(&self) -> Option<Vec<u8>> {
        None
    }
}

/// An account with freshly generated keys, held in memory.
pub struct LocalAccount {
    name: String,
    account: SigningKey,
    device: SigningKey,
    not_after: i64,
    crl: Option<Vec<u8>>,
    known: RwLock<HashMap<String, Certificate>>,
}

impl LocalAccount {
    /// New account and device keys, valid for one year.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::with_validity(name, Duration::days(365))
    }

    pub fn with_validity(name: impl Into<String>, validity: Duration) -> Self {
        Self {
            name: name.into(),
            account: SigningKey::generate(),
            device: SigningKey::generate(),
            not_after: (Utc::now() + validity).timestamp(),
            crl: None,
            known: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_revocation_list(mut self, crl: Vec<u8>) -> Self {
        self.crl = Some(crl);
        self
    }

    /// Remember the certificate of another device.
    pub fn remember(&self, cert: Certificate) {
        self.known
            .write()
            .expect("lock poisoned")
            .insert(cert.id(), cert);
    }

    pub fn not_after(&self) -> i64 {
        self.not_after
    }
}

impl Account for LocalAccount {
    fn uri(&self) -> String {
        self.account.fingerprint()
    }

    fn device_id(&self) -> String {
        self.device.fingerprint()
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn sign(&self, data: &[u8]) -> Signature {
        self.device.sign(data)
    }

    fn account_certificate(&self) -> Certificate {
        Certificate::issue_self(&self.account, &self.name, self.not_after)
    }

    fn device_certificate(&self) -> Certificate {
        Certificate::issue(
            &self.device.verifying_key(),
            &self.account,
            format!("{}'s device", self.name),
            self.not_after,
        )
    }

    fn certificate_for(&self, device: &str) -> Option<Certificate> {
        if device == self.device_id() {
            return Some(self.device_certificate());
        }
        self.known
            .read()
            .expect("lock poisoned")
            .get(device)
            .cloned()
    }

    fn is_valid_device(&self, cert: &Certificate) -> bool {
        cert.verify_signature().is_ok()
            && !cert.is_self_issued()
            && !cert.is_expired_at(Utc::now().timestamp())
    }

    fn revocation_list(&self) -> Option<Vec<u8>> {
        self.crl.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_is_issued_by_the_account() {
        let alice = LocalAccount::generate("alice");
        let device = alice.device_certificate();
        assert_eq!(device.id(), alice.device_id());
        assert_eq!(device.issuer_uid(), alice.uri());
        assert_eq!(alice.account_certificate().id(), alice.uri());
        assert!(alice.is_valid_device(&device));
        assert!(!alice.is_valid_device(&alice.account_certificate()));
    }

    #[test]
    fn signatures_verify_with_the_device_key() {
        let alice = LocalAccount::generate("alice");
        let signature = alice.sign(b"payload");
        let key = alice.device_certificate().subject_key().unwrap();
        assert!(key.verify(b"payload", &signature).is_ok());
    }

    #[test]
    fn expired_devices_are_invalid() {
        let old = LocalAccount::with_validity("old", Duration::days(-1));
        assert!(!old.is_valid_device(&old.device_certificate()));
    }

    #[test]
    fn remembered_certificates() {
        let alice = LocalAccount::generate("alice");
        let bob = LocalAccount::generate("bob");
        assert!(alice.certificate_for(&bob.device_id()).is_none());
        alice.remember(bob.device_certificate());
        let cert = alice.certificate_for(&bob.device_id()).unwrap();
        assert_eq!(cert.issuer_uid(), bob.uri());
        assert!(alice.certificate_for(&alice.device_id()).is_some());
    }
}
