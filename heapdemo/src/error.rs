use std::error::Error;
use std::fmt;
use std::io;

use bestfit::{AllocError, LayoutError};

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    IOError(String),
    BadAllocationRequest,
    OutOfMemory,
    BadLayout(String),
    CheckFailed(String),
}

/// A demo run error type
#[derive(Debug, PartialEq)]
pub struct DemoError {
    kind: ErrorKind,
}

impl DemoError {
    pub fn new(kind: ErrorKind) -> DemoError {
        DemoError { kind }
    }

    pub fn error_kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::IOError(ref reason) => write!(f, "IO Error: {}", reason),
            ErrorKind::BadAllocationRequest => {
                write!(f, "An invalid memory size allocation was requested!")
            }
            ErrorKind::OutOfMemory => write!(f, "Out of memory!"),
            ErrorKind::BadLayout(ref reason) => write!(f, "Bad object layout: {}", reason),
            ErrorKind::CheckFailed(ref reason) => write!(f, "Check failed: {}", reason),
        }
    }
}

impl Error for DemoError {}

/// Convert from io::Error
impl From<io::Error> for DemoError {
    fn from(other: io::Error) -> DemoError {
        DemoError::new(ErrorKind::IOError(format!("{}", other)))
    }
}

/// Convert from AllocError
impl From<AllocError> for DemoError {
    fn from(other: AllocError) -> DemoError {
        match other {
            AllocError::OOM => DemoError::new(ErrorKind::OutOfMemory),
            AllocError::BadRequest => DemoError::new(ErrorKind::BadAllocationRequest),
        }
    }
}

/// Convert from LayoutError
impl From<LayoutError> for DemoError {
    fn from(other: LayoutError) -> DemoError {
        DemoError::new(ErrorKind::BadLayout(format!("{}", other)))
    }
}

/// Convenience shorthand function for building a failed check error
pub fn err_check(reason: &str) -> DemoError {
    DemoError::new(ErrorKind::CheckFailed(String::from(reason)))
}
