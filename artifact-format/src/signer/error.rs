use crate::error::ErrorKind;

#[derive(Debug)]
pub enum Error {
    // PEM / key loading
    ReadKeyFile(std::io::Error),
    UnsupportedAlgorithm,
    InvalidEcdsaCurveSize,
    DecodePkcs1(rsa::pkcs1::Error),
    DecodePkcs8(rsa::pkcs8::Error),
    DecodeSpki(rsa::pkcs8::spki::Error),
    DecodeEcdsaKey(ecdsa::Error),

    // sign / verify
    InvalidSignatureEncoding(rsa::signature::Error),
    BadSignature,
    Base64Decode(base64::DecodeError),

    // configuration (remote backends)
    MissingEnvVar(&'static str),
    InvalidEnvVar { var: &'static str, reason: &'static str },

    // remote transport
    Transport(reqwest::Error),
    RemoteStatus { backend: &'static str, status: reqwest::StatusCode },
    RemoteResponseShape(&'static str),
    Crc32cMismatch,

    // PKCS#11
    Pkcs11(String),
    InvalidPkcs11Uri(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            ReadKeyFile(_) => ErrorKind::Io,
            UnsupportedAlgorithm | InvalidEcdsaCurveSize => ErrorKind::Configuration,
            DecodePkcs1(_) | DecodePkcs8(_) | DecodeSpki(_) | DecodeEcdsaKey(_) => ErrorKind::Configuration,
            InvalidSignatureEncoding(_) | BadSignature => ErrorKind::Integrity,
            Base64Decode(_) => ErrorKind::Format,
            MissingEnvVar(_) | InvalidEnvVar { .. } => ErrorKind::Configuration,
            Transport(_) => ErrorKind::Remote,
            RemoteStatus { .. } | RemoteResponseShape(_) | Crc32cMismatch => ErrorKind::Remote,
            Pkcs11(_) | InvalidPkcs11Uri(_) => ErrorKind::Configuration,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ReadKeyFile(err) => write!(f, "failed to read key material: {err}"),
            Error::UnsupportedAlgorithm => write!(f, "unsupported key algorithm: only RSA and ECDSA P-256 are supported"),
            Error::InvalidEcdsaCurveSize => write!(f, "invalid ecdsa curve size"),
            Error::DecodePkcs1(err) => write!(f, "failed to decode PKCS#1 key: {err}"),
            Error::DecodePkcs8(err) => write!(f, "failed to decode PKCS#8 key: {err}"),
            Error::DecodeSpki(err) => write!(f, "failed to decode SPKI public key: {err}"),
            Error::DecodeEcdsaKey(err) => write!(f, "failed to decode ECDSA key: {err}"),
            Error::InvalidSignatureEncoding(err) => write!(f, "invalid signature encoding: {err}"),
            Error::BadSignature => write!(f, "signature verification failed"),
            Error::Base64Decode(err) => write!(f, "invalid base64 signature: {err}"),
            Error::MissingEnvVar(var) => write!(f, "missing required environment variable: {var}"),
            Error::InvalidEnvVar { var, reason } => write!(f, "invalid value for {var}: {reason}"),
            Error::Transport(err) => write!(f, "remote signer transport error: {err}"),
            Error::RemoteStatus { backend, status } => write!(f, "{backend} returned status {status}"),
            Error::RemoteResponseShape(reason) => write!(f, "unexpected remote signer response: {reason}"),
            Error::Crc32cMismatch => write!(f, "CRC32C checksum mismatch on remote signer response"),
            Error::Pkcs11(reason) => write!(f, "PKCS#11 error: {reason}"),
            Error::InvalidPkcs11Uri(uri) => write!(f, "invalid pkcs11 URI: {uri}"),
        }
    }
}

impl From<rsa::pkcs1::Error> for Error {
    fn from(err: rsa::pkcs1::Error) -> Self {
        Error::DecodePkcs1(err)
    }
}

impl From<rsa::pkcs8::Error> for Error {
    fn from(err: rsa::pkcs8::Error) -> Self {
        Error::DecodePkcs8(err)
    }
}

impl From<rsa::pkcs8::spki::Error> for Error {
    fn from(err: rsa::pkcs8::spki::Error) -> Self {
        Error::DecodeSpki(err)
    }
}

impl From<ecdsa::Error> for Error {
    fn from(err: ecdsa::Error) -> Self {
        Error::DecodeEcdsaKey(err)
    }
}

impl From<rsa::signature::Error> for Error {
    fn from(err: rsa::signature::Error) -> Self {
        Error::InvalidSignatureEncoding(err)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Base64Decode(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ReadKeyFile(err)
    }
}
