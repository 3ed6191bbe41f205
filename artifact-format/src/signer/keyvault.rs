//! Azure-style Key Vault signer (spec.md §4.3, §6.3). Reads `KEY_VAULT_NAME`
//! (validated: 3-24 alphanumerics, no leading/trailing/consecutive dashes)
//! and optional `KEY_VAULT_KEY_VERSION`, signs over the vault's `/sign`
//! operation, and verifies by fetching and decoding the key's JWK into a
//! PEM the built-in PKI verifier already knows how to check.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::pkcs8::EncodePublicKey as EcEncodePublicKey;
use p256::{EncodedPoint, PublicKey as EcPublicKey};
use regex::Regex;
use reqwest::blocking::Client;
use rsa::pkcs8::EncodePublicKey as RsaEncodePublicKey;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::pki::PkiSigner;
use super::{Error, Result, Signer};

const HTTP_CONN_TIMEOUT: u64 = 20;
const HTTP_TOTAL_TIMEOUT: u64 = 60;
const API_VERSION: &str = "7.4";

#[derive(Clone, Copy)]
pub enum KeyVaultAlgorithm {
    Rsa,
    EcdsaP256,
}

impl KeyVaultAlgorithm {
    fn alg_name(self) -> &'static str {
        match self {
            KeyVaultAlgorithm::Rsa => "RS256",
            KeyVaultAlgorithm::EcdsaP256 => "ES256",
        }
    }
}

fn validate_vault_name(name: &str) -> Result<()> {
    let shape = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").expect("static regex");
    let ok = (3..=24).contains(&name.len()) && shape.is_match(name) && !name.contains("--");
    if !ok {
        return Err(Error::InvalidEnvVar {
            var: "KEY_VAULT_NAME",
            reason: "must be 3-24 alphanumerics, no leading/trailing/consecutive dashes",
        });
    }
    Ok(())
}

pub struct KeyVaultSigner {
    client: Client,
    vault_name: String,
    key_name: String,
    key_version: String,
    access_token: String,
    algorithm: KeyVaultAlgorithm,
}

impl KeyVaultSigner {
    pub fn new(key_name: impl Into<String>, algorithm: KeyVaultAlgorithm) -> Result<Self> {
        let vault_name = std::env::var("KEY_VAULT_NAME").map_err(|_| Error::MissingEnvVar("KEY_VAULT_NAME"))?;
        validate_vault_name(&vault_name)?;
        let key_version = std::env::var("KEY_VAULT_KEY_VERSION").unwrap_or_default();
        let access_token = std::env::var("AZURE_ACCESS_TOKEN").map_err(|_| Error::MissingEnvVar("AZURE_ACCESS_TOKEN"))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONN_TIMEOUT))
            .timeout(Duration::from_secs(HTTP_TOTAL_TIMEOUT))
            .build()?;
        Ok(KeyVaultSigner { client, vault_name, key_name: key_name.into(), key_version, access_token, algorithm })
    }

    fn key_url(&self, operation: &str) -> String {
        let mut url = format!("https://{}.vault.azure.net/keys/{}", self.vault_name, self.key_name);
        if !self.key_version.is_empty() {
            url.push('/');
            url.push_str(&self.key_version);
        }
        url.push('/');
        url.push_str(operation);
        format!("{url}?api-version={API_VERSION}")
    }

    fn public_key_pem(&self) -> Result<String> {
        let mut url = format!("https://{}.vault.azure.net/keys/{}", self.vault_name, self.key_name);
        if !self.key_version.is_empty() {
            url.push('/');
            url.push_str(&self.key_version);
        }
        url = format!("{url}?api-version={API_VERSION}");

        let resp = self.client.get(&url).bearer_auth(&self.access_token).send()?;
        if !resp.status().is_success() {
            return Err(Error::RemoteStatus { backend: "key vault", status: resp.status() });
        }
        let body: GetKeyResponse = resp.json()?;
        jwk_to_pem(&body.key)
    }
}

#[derive(Serialize)]
struct SignRequest<'a> {
    alg: &'a str,
    value: String,
}

#[derive(Deserialize)]
struct SignResponse {
    value: String,
}

#[derive(Deserialize)]
struct GetKeyResponse {
    key: JsonWebKey,
}

#[derive(Deserialize)]
struct JsonWebKey {
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

fn jwk_to_pem(jwk: &JsonWebKey) -> Result<String> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n_bytes = URL_SAFE_NO_PAD.decode(jwk.n.as_deref().ok_or(Error::RemoteResponseShape("RSA JWK missing n"))?)?;
            let e_bytes = URL_SAFE_NO_PAD.decode(jwk.e.as_deref().ok_or(Error::RemoteResponseShape("RSA JWK missing e"))?)?;
            let public = RsaPublicKey::new(BigUint::from_bytes_be(&n_bytes), BigUint::from_bytes_be(&e_bytes))
                .map_err(|_| Error::RemoteResponseShape("invalid RSA JWK modulus/exponent"))?;
            RsaEncodePublicKey::to_public_key_pem(&public, Default::default()).map_err(|_| Error::RemoteResponseShape("failed to encode RSA public key"))
        }
        "EC" | "EC-HSM" => {
            let x = URL_SAFE_NO_PAD.decode(jwk.x.as_deref().ok_or(Error::RemoteResponseShape("EC JWK missing x"))?)?;
            let y = URL_SAFE_NO_PAD.decode(jwk.y.as_deref().ok_or(Error::RemoteResponseShape("EC JWK missing y"))?)?;
            let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
            sec1.push(0x04);
            sec1.extend_from_slice(&x);
            sec1.extend_from_slice(&y);
            let point = EncodedPoint::from_bytes(&sec1).map_err(|_| Error::RemoteResponseShape("invalid EC JWK point"))?;
            let public = EcPublicKey::from_encoded_point(&point);
            let public: EcPublicKey = Option::from(public).ok_or(Error::RemoteResponseShape("EC JWK point not on curve"))?;
            EcEncodePublicKey::to_public_key_pem(&public, Default::default()).map_err(|_| Error::RemoteResponseShape("failed to encode EC public key"))
        }
        _ => Err(Error::RemoteResponseShape("unsupported JWK kty")),
    }
}

impl Signer for KeyVaultSigner {
    fn sign(&self, message: &[u8]) -> Result<String> {
        let digest = Sha256::digest(message);
        let req = SignRequest { alg: self.algorithm.alg_name(), value: URL_SAFE_NO_PAD.encode(digest) };

        let resp = self.client.post(self.key_url("sign")).bearer_auth(&self.access_token).json(&req).send()?;
        if !resp.status().is_success() {
            return Err(Error::RemoteStatus { backend: "key vault", status: resp.status() });
        }
        let body: SignResponse = resp.json()?;
        let raw = URL_SAFE_NO_PAD.decode(&body.value)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(raw))
    }

    fn verify(&self, message: &[u8], signature: &str) -> Result<()> {
        let pem = self.public_key_pem()?;
        PkiSigner::from_public_key_pem(&pem)?.verify(message, signature)
    }
}
