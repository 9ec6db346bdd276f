//! Device certificates and the device to member binding.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use tracing::debug;

use convlog_crypto::Certificate;
use convlog_store::{ObjectStore, Snapshot};

use crate::error::MembershipResult;
use crate::paths::{self, DEVICES};
use crate::table::has_account_certificate;

/// Decode the certificate at `devices/<device>.crt`.
///
/// A file that does not decode is treated as absent.
pub fn device_certificate(
    store: &dyn ObjectStore,
    snap: &Snapshot,
    device: &str,
) -> MembershipResult<Option<Certificate>> {
    let Some(data) = snap.read_file(store, &paths::device_cert(device))? else {
        return Ok(None);
    };
    Ok(Certificate::from_bytes(&data).ok())
}

/// Every decodable device certificate, keyed by device id.
pub fn devices(
    store: &dyn ObjectStore,
    snap: &Snapshot,
) -> MembershipResult<BTreeMap<String, Certificate>> {
    let mut result = BTreeMap::new();
    for file in snap.list_dir(DEVICES) {
        let Some(device) = file.strip_suffix(paths::CERT_EXT) else {
            continue;
        };
        if let Some(cert) = device_certificate(store, snap, device)? {
            result.insert(device.to_string(), cert);
        }
    }
    Ok(result)
}

/// Devices whose certificate was issued by `uri`.
pub fn devices_of(
    store: &dyn ObjectStore,
    snap: &Snapshot,
    uri: &str,
) -> MembershipResult<Vec<String>> {
    Ok(devices(store, snap)?
        .into_iter()
        .filter(|(_, cert)| cert.issuer_uid() == uri)
        .map(|(device, _)| device)
        .collect())
}

/// Shared device id to owner uri cache.
///
/// The binding is fully derivable from the tree; the cache only saves
/// certificate decoding. The lock is taken per lookup and per insert and
/// never held while reading the store.
#[derive(Debug, Default)]
pub struct DeviceOwnerCache {
    owners: RwLock<HashMap<String, String>>,
}

impl DeviceOwnerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, device: &str) -> Option<String> {
        self.owners
            .read()
            .expect("lock poisoned")
            .get(device)
            .cloned()
    }

    pub fn insert(&self, device: impl Into<String>, uri: impl Into<String>) {
        self.owners
            .write()
            .expect("lock poisoned")
            .insert(device.into(), uri.into());
    }

    pub fn len(&self) -> usize {
        self.owners.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.owners.write().expect("lock poisoned").clear();
    }

    /// Copy every binding of `other` into this cache.
    pub fn absorb(&self, other: &DeviceOwnerCache) {
        let entries = other.owners.read().expect("lock poisoned").clone();
        self.owners.write().expect("lock poisoned").extend(entries);
    }

    /// Owner of `device` according to `snap`.
    ///
    /// The device certificate's issuer is accepted only if that uri holds
    /// an account certificate in the same snapshot.
    pub fn owner(
        &self,
        store: &dyn ObjectStore,
        snap: &Snapshot,
        device: &str,
    ) -> MembershipResult<Option<String>> {
        if let Some(uri) = self.cached(device) {
            return Ok(Some(uri));
        }
        let Some(cert) = device_certificate(store, snap, device)? else {
            return Ok(None);
        };
        let issuer = cert.issuer_uid();
        if issuer.is_empty() || !has_account_certificate(snap, &issuer) {
            return Ok(None);
        }
        debug!(device, uri = %issuer, "cached device owner");
        self.insert(device, issuer.clone());
        Ok(Some(issuer))
    }
}
