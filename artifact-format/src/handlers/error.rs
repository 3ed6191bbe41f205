use crate::error::ErrorKind;

#[derive(Debug)]
pub enum Error {
    Metadata(crate::metadata::Error),
    Io(std::io::Error),
    ChecksumMismatch { name: String },
    UnexpectedFile(String),
    MissingFile(String),
    UnexpectedFilesEntryInV3,
    InvalidAugmentMerge(String),
    InvalidAugmentField(&'static str),
    DuplicateHandlerType(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Metadata(err) => err.kind(),
            Error::Io(_) => ErrorKind::Io,
            Error::ChecksumMismatch { .. } => ErrorKind::Integrity,
            Error::UnexpectedFile(_) | Error::MissingFile(_) | Error::UnexpectedFilesEntryInV3 => ErrorKind::Format,
            Error::InvalidAugmentMerge(_) | Error::InvalidAugmentField(_) => ErrorKind::Format,
            Error::DuplicateHandlerType(_) => ErrorKind::Configuration,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Metadata(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "{err}"),
            Error::ChecksumMismatch { name } => write!(f, "checksum mismatch for {name}"),
            Error::UnexpectedFile(name) => write!(f, "unexpected file in payload data: {name}"),
            Error::MissingFile(name) => write!(f, "payload data is missing declared file: {name}"),
            Error::UnexpectedFilesEntryInV3 => write!(f, "v3 payload header must not contain a files entry"),
            Error::InvalidAugmentMerge(reason) => write!(f, "invalid augmented header merge: {reason}"),
            Error::InvalidAugmentField(field) => write!(f, "augmented header may not override {field}"),
            Error::DuplicateHandlerType(type_name) => write!(f, "handler already registered for type {type_name}"),
        }
    }
}

impl From<crate::metadata::Error> for Error {
    fn from(err: crate::metadata::Error) -> Self {
        Error::Metadata(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
