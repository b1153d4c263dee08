use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum KilnError {
    StringError(String),
    IoError(Arc<std::io::Error>),
    JsonError(Arc<serde_json::Error>),
}

impl std::error::Error for KilnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            KilnError::StringError(_) => None,
            KilnError::IoError(ref e) => Some(&**e),
            KilnError::JsonError(ref e) => Some(&**e),
        }
    }
}

impl core::fmt::Display for KilnError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            KilnError::StringError(ref e) => e.fmt(fmt),
            KilnError::IoError(ref e) => e.fmt(fmt),
            KilnError::JsonError(ref e) => e.fmt(fmt),
        }
    }
}

impl From<&str> for KilnError {
    fn from(str: &str) -> Self {
        KilnError::StringError(str.to_string())
    }
}

impl From<String> for KilnError {
    fn from(string: String) -> Self {
        KilnError::StringError(string)
    }
}

impl From<std::io::Error> for KilnError {
    fn from(error: std::io::Error) -> Self {
        KilnError::IoError(Arc::new(error))
    }
}

impl From<serde_json::Error> for KilnError {
    fn from(error: serde_json::Error) -> Self {
        KilnError::JsonError(Arc::new(error))
    }
}

pub type KilnResult<T> = Result<T, KilnError>;
