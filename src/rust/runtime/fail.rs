// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::libc::{
    c_int,
    EINVAL,
    EIO,
};
use ::std::{
    error,
    fmt,
    io,
};
use ::yaml_rust::ScanError;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Failure
///
/// Carries an errno-style code so that callers can tell a faulted coroutine (whatever code the body chose), a
/// rejected launch (`ECANCELED`), an escalated timeout (`ETIMEDOUT`) and a scheduler misuse (`EPERM`/`EBUSY`) apart
/// without string matching.
#[derive(Clone, PartialEq, Eq)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// Builds the failure reported for a coroutine body that panicked while being resumed.
    pub fn from_panic(payload: &(dyn ::std::any::Any + Send)) -> Self {
        let message: &str = if let Some(s) = payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "unknown panic payload"
        };
        Self::new(libc::EFAULT, &format!("coroutine panicked: {}", message))
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Debug trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {}

/// Conversion Trait Implementation for Fail
impl From<io::Error> for Fail {
    fn from(e: io::Error) -> Self {
        Self {
            errno: e.raw_os_error().unwrap_or(EIO),
            cause: format!("I/O error: {}", e),
        }
    }
}

/// Conversion Trait Implementation for Fail
impl From<ScanError> for Fail {
    fn from(e: ScanError) -> Self {
        Self {
            errno: EINVAL,
            cause: format!("malformed configuration: {}", e),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
