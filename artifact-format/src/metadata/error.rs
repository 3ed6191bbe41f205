use crate::error::ErrorKind;

pub type ValidationErrors = Vec<String>;

#[derive(Debug)]
pub enum Error {
    Json(serde_json::Error),
    Validation(ValidationErrors),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Json(_) => ErrorKind::Format,
            Error::Validation(_) => ErrorKind::Validation,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Json(err) => write!(f, "malformed metadata JSON: {err}"),
            Error::Validation(reasons) => write!(f, "metadata validation failed: {}", reasons.join("; ")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<ValidationErrors> for Error {
    fn from(reasons: ValidationErrors) -> Self {
        Error::Validation(reasons)
    }
}
