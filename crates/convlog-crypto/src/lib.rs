//! Cryptographic primitives for convlog.
//!
//! Provides domain-separated BLAKE3 hashing, Ed25519 signing/verification,
//! and the account/device certificates that bind a device key to a member uri.

pub mod certificate;
pub mod hasher;
pub mod signer;

pub use certificate::{verify_certificate, Certificate, CertificateError};
pub use hasher::ContentHasher;
pub use signer::{fingerprint, Signature, SignatureError, SigningKey, VerifyingKey};
