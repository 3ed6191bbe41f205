use crate::error::ErrorKind;

#[derive(Debug)]
pub enum Error {
    Mismatch { path: String, expected: String, actual: String },
    AlreadyExists(String),
    NotFound(String),
    MalformedLine(String),
    Io(std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Mismatch { .. } => ErrorKind::Integrity,
            Error::AlreadyExists(_) => ErrorKind::Format,
            Error::NotFound(_) => ErrorKind::Format,
            Error::MalformedLine(_) => ErrorKind::Format,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Mismatch { path, expected, actual } => {
                write!(f, "checksum mismatch for {path}: expected {expected}, got {actual}")
            }
            Error::AlreadyExists(path) => write!(f, "checksum already recorded for {path}"),
            Error::NotFound(path) => write!(f, "no checksum recorded for {path}"),
            Error::MalformedLine(line) => write!(f, "malformed manifest line: {line:?}"),
            Error::Io(err) => write!(f, "checksum I/O error: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
