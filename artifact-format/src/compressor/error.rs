use crate::error::ErrorKind;

#[derive(Debug)]
pub enum Error {
    UnsupportedCompressor(String),
    DuplicateId(String),
    Io(std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedCompressor(_) => ErrorKind::Configuration,
            Error::DuplicateId(_) => ErrorKind::Configuration,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnsupportedCompressor(id) => write!(f, "unsupported compressor: {id}"),
            Error::DuplicateId(id) => write!(f, "compressor already registered: {id}"),
            Error::Io(err) => write!(f, "compressor I/O error: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
