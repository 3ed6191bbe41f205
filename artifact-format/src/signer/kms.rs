//! Cloud KMS asymmetric-sign backend (spec.md §4.3, §6.3). Sends the SHA-256
//! digest of the manifest to a `cryptoKeyVersions/...:asymmetricSign` style
//! endpoint, validates the response's CRC32C checksum when the backend sends
//! one, and re-marshals DER-encoded ECDSA signatures to the built-in `r || s`
//! form. HTTP client setup follows download/mod.rs's blocking-reqwest
//! pattern: fixed connect/total timeouts, no retry loop at this layer.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::pki::{marshal_ecdsa_der_to_fixed, PkiSigner};
use super::{Error, Result, Signer};

const HTTP_CONN_TIMEOUT: u64 = 20;
const HTTP_TOTAL_TIMEOUT: u64 = 60;
const API_ROOT: &str = "https://cloudkms.googleapis.com/v1";

#[derive(Serialize)]
struct AsymmetricSignRequest<'a> {
    digest: Digest256<'a>,
}

#[derive(Serialize)]
struct Digest256<'a> {
    sha256: &'a str,
}

#[derive(Deserialize)]
struct AsymmetricSignResponse {
    signature: String,
    #[serde(default)]
    signature_crc32c: Option<String>,
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    pem: String,
}

/// Signs against a key version's full resource name
/// (`projects/.../cryptoKeyVersions/...`). Credentials are ambient: an
/// already-minted OAuth2 access token supplied out of band.
pub struct KmsSigner {
    client: Client,
    resource_name: String,
    access_token: String,
}

impl KmsSigner {
    pub fn new(resource_name: impl Into<String>) -> Result<Self> {
        let access_token = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").map_err(|_| Error::MissingEnvVar("GOOGLE_OAUTH_ACCESS_TOKEN"))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONN_TIMEOUT))
            .timeout(Duration::from_secs(HTTP_TOTAL_TIMEOUT))
            .build()?;
        Ok(KmsSigner { client, resource_name: resource_name.into(), access_token })
    }

    fn public_key_pem(&self) -> Result<String> {
        let url = format!("{API_ROOT}/{}/publicKey", self.resource_name);
        let resp = self.client.get(&url).bearer_auth(&self.access_token).send()?;
        if !resp.status().is_success() {
            return Err(Error::RemoteStatus { backend: "cloud kms", status: resp.status() });
        }
        Ok(resp.json::<PublicKeyResponse>()?.pem)
    }
}

impl Signer for KmsSigner {
    fn sign(&self, message: &[u8]) -> Result<String> {
        let digest = Sha256::digest(message);
        let req = AsymmetricSignRequest { digest: Digest256 { sha256: &BASE64.encode(digest) } };

        let url = format!("{API_ROOT}/{}:asymmetricSign", self.resource_name);
        let resp = self.client.post(&url).bearer_auth(&self.access_token).json(&req).send()?;
        if !resp.status().is_success() {
            return Err(Error::RemoteStatus { backend: "cloud kms", status: resp.status() });
        }
        let body: AsymmetricSignResponse = resp.json()?;
        let raw = BASE64.decode(&body.signature)?;

        if let Some(expected) = body.signature_crc32c.as_deref() {
            let expected: u32 = expected.parse().map_err(|_| Error::RemoteResponseShape("non-numeric signatureCrc32c"))?;
            if crc32c::crc32c(&raw) != expected {
                return Err(Error::Crc32cMismatch);
            }
        }

        // RSA keys already return raw PKCS#1 v1.5 bytes; EC keys return
        // ASN.1 DER, which needs re-marshaling to the fixed layout.
        let normalized = marshal_ecdsa_der_to_fixed(&raw).unwrap_or(raw);
        Ok(BASE64.encode(normalized))
    }

    fn verify(&self, message: &[u8], signature: &str) -> Result<()> {
        let pem = self.public_key_pem()?;
        PkiSigner::from_public_key_pem(&pem)?.verify(message, signature)
    }
}
