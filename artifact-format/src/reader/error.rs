use crate::error::ErrorKind;

#[derive(Debug)]
pub enum Error {
    UnsupportedVersion(u32),
    /// The outer tar ended, or the next entry's path didn't match, before a
    /// required member was seen.
    MissingEntry(&'static str),
    UnexpectedEntry(String),
    PathTraversal(String),
    VersionMismatch { expected: String, actual: String },
    /// `manifest.sig` is present but no verifying key was supplied.
    SignedButNoKey,
    /// A verifying key was supplied but the artifact carries no `manifest.sig`.
    UnsignedButKeySupplied,
    IncompatibleDevice,
    UnexpectedDataFile(String),
    MissingDataFile { index: usize, name: String },
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
            Error::MissingEntry(_) => ErrorKind::Format,
            Error::UnexpectedEntry(_) => ErrorKind::Format,
            Error::PathTraversal(_) => ErrorKind::Format,
            Error::VersionMismatch { .. } => ErrorKind::Integrity,
            Error::SignedButNoKey => ErrorKind::Configuration,
            Error::UnsignedButKeySupplied => ErrorKind::Configuration,
            Error::IncompatibleDevice => ErrorKind::Validation,
            Error::UnexpectedDataFile(_) => ErrorKind::Format,
            Error::MissingDataFile { .. } => ErrorKind::Format,
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
            Error::MissingEntry(name) => write!(f, "artifact is missing the required {name} entry"),
            Error::UnexpectedEntry(name) => write!(f, "unexpected entry in artifact: {name}"),
            Error::PathTraversal(path) => write!(f, "unsafe path inside artifact: {path}"),
            Error::VersionMismatch { expected, actual } => {
                write!(f, "manifest records {expected} for version, but the version entry hashes to {actual}")
            }
            Error::SignedButNoKey => write!(f, "artifact carries a manifest.sig but no verifying key was supplied"),
            Error::UnsignedButKeySupplied => write!(f, "a verifying key was supplied but the artifact carries no manifest.sig"),
            Error::IncompatibleDevice => write!(f, "artifact is not compatible with this device"),
            Error::UnexpectedDataFile(name) => write!(f, "unexpected file in payload data: {name}"),
            Error::MissingDataFile { index, name } => write!(f, "payload {index} data archive is missing declared file {name}"),
            Error::Checksum(err) => write!(f, "{err}"),
            Error::Compressor(err) => write!(f, "{err}"),
            Error::Metadata(err) => write!(f, "{err}"),
            Error::Handler(err) => write!(f, "{err}"),
            Error::Signer(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "{err}"),
        }
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
