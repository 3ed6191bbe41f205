//! PKCS#11 (HSM) signer (spec.md §4.3, §6.3). Keys are addressed by a
//! `pkcs11:` URI carrying the module path, token label, object label and PIN
//! as query-like components, following the same loose-parsing spirit as the
//! rest of the signer backends' environment surface rather than a strict
//! RFC 7512 implementation.

use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, ObjectClass, ObjectHandle};
use cryptoki::session::UserType;
use cryptoki::types::AuthPin;
use sha2::{Digest, Sha256};

use super::{Error, Result, Signer};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Pkcs11KeyKind {
    Rsa,
    EcdsaP256,
}

struct Pkcs11Uri {
    module_path: String,
    token_label: String,
    object_label: String,
    pin: String,
}

fn parse_pkcs11_uri(uri: &str) -> Result<Pkcs11Uri> {
    let rest = uri.strip_prefix("pkcs11:").ok_or_else(|| Error::InvalidPkcs11Uri(uri.to_string()))?;

    let mut module_path = None;
    let mut token_label = None;
    let mut object_label = None;
    let mut pin = None;

    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    for component in path_part.split(';').chain(query_part.into_iter().flat_map(|q| q.split('&'))) {
        let Some((key, value)) = component.split_once('=') else { continue };
        match key {
            "module-path" => module_path = Some(value.to_string()),
            "token" => token_label = Some(value.to_string()),
            "object" => object_label = Some(value.to_string()),
            "pin-value" => pin = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(Pkcs11Uri {
        module_path: module_path.ok_or_else(|| Error::InvalidPkcs11Uri(uri.to_string()))?,
        token_label: token_label.ok_or_else(|| Error::InvalidPkcs11Uri(uri.to_string()))?,
        object_label: object_label.ok_or_else(|| Error::InvalidPkcs11Uri(uri.to_string()))?,
        pin: pin.ok_or_else(|| Error::InvalidPkcs11Uri(uri.to_string()))?,
    })
}

pub struct Pkcs11Signer {
    pkcs11: Pkcs11,
    uri: Pkcs11Uri,
    kind: Pkcs11KeyKind,
    // cryptoki sessions are not Sync; guard with a mutex so the signer
    // itself can still be shared the way the other backends are.
    session: Mutex<()>,
}

impl Pkcs11Signer {
    pub fn new(uri: &str, kind: Pkcs11KeyKind) -> Result<Self> {
        let parsed = parse_pkcs11_uri(uri)?;
        let pkcs11 = Pkcs11::new(&parsed.module_path).map_err(|err| Error::Pkcs11(err.to_string()))?;
        pkcs11.initialize(CInitializeArgs::OsThreads).map_err(|err| Error::Pkcs11(err.to_string()))?;
        Ok(Pkcs11Signer { pkcs11, uri: parsed, kind, session: Mutex::new(()) })
    }

    fn mechanism(&self) -> Mechanism<'static> {
        match self.kind {
            Pkcs11KeyKind::Rsa => Mechanism::Sha256RsaPkcs,
            Pkcs11KeyKind::EcdsaP256 => Mechanism::Ecdsa,
        }
    }

    fn find_slot(&self) -> Result<cryptoki::slot::Slot> {
        self.pkcs11
            .get_slots_with_token()
            .map_err(|err| Error::Pkcs11(err.to_string()))?
            .into_iter()
            .find(|slot| {
                self.pkcs11
                    .get_token_info(*slot)
                    .map(|info| info.label().trim() == self.uri.token_label)
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::Pkcs11(format!("no token found with label {}", self.uri.token_label)))
    }

    fn find_object(&self, session: &cryptoki::session::Session, class: ObjectClass) -> Result<ObjectHandle> {
        let attrs = vec![Attribute::Class(class), Attribute::Label(self.uri.object_label.as_bytes().to_vec())];
        let handles = session.find_objects(&attrs).map_err(|err| Error::Pkcs11(err.to_string()))?;
        handles
            .into_iter()
            .next()
            .ok_or_else(|| Error::Pkcs11(format!("no object found with label {}", self.uri.object_label)))
    }
}

impl Signer for Pkcs11Signer {
    fn sign(&self, message: &[u8]) -> Result<String> {
        let _guard = self.session.lock().expect("pkcs11 session mutex poisoned");
        let slot = self.find_slot()?;
        let session = self.pkcs11.open_rw_session(slot).map_err(|err| Error::Pkcs11(err.to_string()))?;
        session.login(UserType::User, Some(&AuthPin::new(self.uri.pin.clone()))).map_err(|err| Error::Pkcs11(err.to_string()))?;

        let handle = self.find_object(&session, ObjectClass::PRIVATE_KEY)?;

        // ECDSA signing in PKCS#11 operates on a pre-computed digest and
        // yields fixed-width r || s directly, matching the built-in layout
        // with no re-marshaling step. RSA's Sha256RsaPkcs mechanism hashes
        // internally, so the raw message is passed instead of a digest.
        let raw = match self.kind {
            Pkcs11KeyKind::Rsa => session.sign(&self.mechanism(), handle, message),
            Pkcs11KeyKind::EcdsaP256 => {
                let digest = Sha256::digest(message);
                session.sign(&self.mechanism(), handle, &digest)
            }
        }
        .map_err(|err| Error::Pkcs11(err.to_string()))?;

        Ok(BASE64.encode(raw))
    }

    fn verify(&self, message: &[u8], signature: &str) -> Result<()> {
        let raw = BASE64.decode(signature)?;

        let _guard = self.session.lock().expect("pkcs11 session mutex poisoned");
        let slot = self.find_slot()?;
        let session = self.pkcs11.open_ro_session(slot).map_err(|err| Error::Pkcs11(err.to_string()))?;

        let handle = self.find_object(&session, ObjectClass::PUBLIC_KEY)?;

        let outcome = match self.kind {
            Pkcs11KeyKind::Rsa => session.verify(&self.mechanism(), handle, message, &raw),
            Pkcs11KeyKind::EcdsaP256 => {
                let digest = Sha256::digest(message);
                session.verify(&self.mechanism(), handle, &digest, &raw)
            }
        };

        outcome.map_err(|_| Error::BadSignature)
    }
}
