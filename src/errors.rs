use std::{io, num::{ParseFloatError, ParseIntError, TryFromIntError}, str::Utf8Error};
use quick_xml::events::attributes::AttrError;

/// How an error should be handled by callers. Most failures are `General`;
/// `StoreMissing` marks an unusable region store (missing index or manifest)
/// and is fatal for any load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    General,
    StoreMissing,
}

#[derive(Debug)]
pub struct Error {
    pub message: String,
    pub kind: ErrorKind,
}

impl Error {
    pub fn store_missing(message: impl Into<String>) -> Error {
        Error {
            message: message.into(),
            kind: ErrorKind::StoreMissing,
        }
    }

    pub fn is_store_missing(&self) -> bool {
        self.kind == ErrorKind::StoreMissing
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(value: TryFromIntError) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error {
            message: value.to_string(),
            kind: ErrorKind::General,
        }
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error {
            message: value,
            kind: ErrorKind::General,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
