use crate::error::ErrorKind;

#[derive(Debug)]
pub enum Error {
    UnsupportedVersion(u32),
    SignedV1Unsupported,
    NoPayloads,
    ScriptsUnsupportedInV1,
    EmptyDeviceType,
    MissingChecksum(String),
    ArtifactTooLarge { limit: u64, actual: u64 },
    InvalidScriptName(crate::script_name::InvalidScriptName),
    Checksum(crate::checksum::Error),
    Compressor(crate::compressor::Error),
    Metadata(crate::metadata::Error),
    Handler(crate::handlers::Error),
    Signer(crate::signer::Error),
    Io(std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            Error::SignedV1Unsupported => ErrorKind::Configuration,
            Error::NoPayloads => ErrorKind::Validation,
            Error::ScriptsUnsupportedInV1 => ErrorKind::Validation,
            Error::EmptyDeviceType => ErrorKind::Validation,
            Error::MissingChecksum(_) => ErrorKind::Format,
            Error::ArtifactTooLarge { .. } => ErrorKind::Validation,
            Error::InvalidScriptName(_) => ErrorKind::Validation,
            Error::Checksum(err) => err.kind(),
            Error::Compressor(err) => err.kind(),
            Error::Metadata(err) => err.kind(),
            Error::Handler(err) => err.kind(),
            Error::Signer(err) => err.kind(),
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnsupportedVersion(v) => write!(f, "unsupported artifact version {v}"),
            Error::SignedV1Unsupported => write!(f, "version 1 artifacts cannot be signed"),
            Error::NoPayloads => write!(f, "an artifact must have at least one payload"),
            Error::ScriptsUnsupportedInV1 => write!(f, "version 1 artifacts cannot carry lifecycle scripts"),
            Error::EmptyDeviceType => write!(f, "artifact_depends.device_type must not be empty for a non-bootstrap artifact"),
            Error::MissingChecksum(name) => write!(f, "no checksum known for data file {name}"),
            Error::ArtifactTooLarge { limit, actual } => write!(f, "artifact size {actual} exceeds the configured limit of {limit}"),
            Error::InvalidScriptName(err) => write!(f, "{err}"),
            Error::Checksum(err) => write!(f, "{err}"),
            Error::Compressor(err) => write!(f, "{err}"),
            Error::Metadata(err) => write!(f, "{err}"),
            Error::Handler(err) => write!(f, "{err}"),
            Error::Signer(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<crate::script_name::InvalidScriptName> for Error {
    fn from(err: crate::script_name::InvalidScriptName) -> Self {
        Error::InvalidScriptName(err)
    }
}

impl From<crate::checksum::Error> for Error {
    fn from(err: crate::checksum::Error) -> Self {
        Error::Checksum(err)
    }
}

impl From<crate::compressor::Error> for Error {
    fn from(err: crate::compressor::Error) -> Self {
        Error::Compressor(err)
    }
}

impl From<crate::metadata::Error> for Error {
    fn from(err: crate::metadata::Error) -> Self {
        Error::Metadata(err)
    }
}

impl From<crate::handlers::Error> for Error {
    fn from(err: crate::handlers::Error) -> Self {
        Error::Handler(err)
    }
}

impl From<crate::signer::Error> for Error {
    fn from(err: crate::signer::Error) -> Self {
        Error::Signer(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
