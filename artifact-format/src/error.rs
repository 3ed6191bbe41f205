//! Crate-wide error type. Every submodule defines its own `Error` enum (see
//! `compressor::Error`, `checksum::Error`, `signer::Error`,
//! `metadata::Error`, `handlers::Error`, `writer::Error`, `reader::Error`)
//! with a `kind(&self) -> ErrorKind` method; this type wraps them so a
//! caller driving the top-level `write_artifact`/`open_artifact` API has a
//! single error type and a stable taxonomy to map to a process exit code
//! (spec.md §6.4).

use std::fmt;

/// The taxonomy from spec.md §7. Kept separate from the variant so the CLI
/// glue layer can match on `kind()` without depending on which submodule
/// produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Format,
    Integrity,
    Configuration,
    /// An artifact declares (or a caller requests) a version outside
    /// `Info::supported_versions()`. Distinct from `Configuration` because
    /// spec.md §6.4 gives it its own exit code.
    UnsupportedVersion,
    Io,
    Remote,
}

#[derive(Debug)]
pub enum Error {
    Compressor(crate::compressor::Error),
    Checksum(crate::checksum::Error),
    Signer(crate::signer::Error),
    Metadata(crate::metadata::Error),
    Handler(crate::handlers::Error),
    Writer(crate::writer::Error),
    Reader(crate::reader::Error),
    Io(std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Compressor(err) => err.kind(),
            Error::Checksum(err) => err.kind(),
            Error::Signer(err) => err.kind(),
            Error::Metadata(err) => err.kind(),
            Error::Handler(err) => err.kind(),
            Error::Writer(err) => err.kind(),
            Error::Reader(err) => err.kind(),
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Compressor(err) => Some(err),
            Error::Checksum(err) => Some(err),
            Error::Signer(err) => Some(err),
            Error::Metadata(err) => Some(err),
            Error::Handler(err) => Some(err),
            Error::Writer(err) => Some(err),
            Error::Reader(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Compressor(err) => write!(f, "{err}"),
            Error::Checksum(err) => write!(f, "{err}"),
            Error::Signer(err) => write!(f, "{err}"),
            Error::Metadata(err) => write!(f, "{err}"),
            Error::Handler(err) => write!(f, "{err}"),
            Error::Writer(err) => write!(f, "{err}"),
            Error::Reader(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<crate::compressor::Error> for Error {
    fn from(err: crate::compressor::Error) -> Self {
        Error::Compressor(err)
    }
}

impl From<crate::checksum::Error> for Error {
    fn from(err: crate::checksum::Error) -> Self {
        Error::Checksum(err)
    }
}

impl From<crate::signer::Error> for Error {
    fn from(err: crate::signer::Error) -> Self {
        Error::Signer(err)
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

impl From<crate::writer::Error> for Error {
    fn from(err: crate::writer::Error) -> Self {
        Error::Writer(err)
    }
}

impl From<crate::reader::Error> for Error {
    fn from(err: crate::reader::Error) -> Self {
        Error::Reader(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// exit code mapping the root crate uses (spec.md §6.4); kept here so a
/// caller linking only this library can reproduce the same mapping without
/// depending on the CLI glue crate.
pub fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => 1,
        ErrorKind::UnsupportedVersion => 2,
        ErrorKind::Configuration => 6,
        ErrorKind::Io => 7,
        ErrorKind::Remote => 7,
        ErrorKind::Format => 5,
        ErrorKind::Integrity => 5,
    }
}
