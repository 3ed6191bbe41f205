//! Signer abstraction (spec.md §4.3): one trait implemented by the built-in
//! PKI signer (RSA / ECDSA P-256) and by remote backends (cloud KMS, Azure-
//! style key vault, Vault transit, PKCS#11). Every implementation transports
//! signatures base64-encoded and signs/verifies the entire `manifest` byte
//! stream handed to it by the writer/reader engine.

mod error;
pub mod keyvault;
pub mod kms;
pub mod pkcs11;
pub mod pki;
pub mod vault;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Implemented by every signing/verification backend. `message` is always
/// the complete `manifest` byte stream; `signature` is always standard,
/// padded base64.
pub trait Signer {
    fn sign(&self, message: &[u8]) -> Result<String>;
    fn verify(&self, message: &[u8], signature: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;

    /// Generates a (small, test-only) RSA key pair in memory. Keeping key
    /// generation in-process instead of loading static PEM fixtures from
    /// disk means the signer tests don't depend on committed key material.
    pub fn rsa_test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 2048).expect("failed to generate test RSA key")
    }
}
