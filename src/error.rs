// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Error type used throughout the engine. Every error resolves to a
//! Cryptoki `CK_RV` so the embedding framework can surface it on the
//! standard API unchanged, while optionally carrying the underlying
//! cause for tracing.

use std::error;
use std::fmt;

use crate::pkcs11::*;

/// Result alias used by all fallible engine calls.
pub type Result<T> = std::result::Result<T, Error>;

/// An engine error, always reducible to a `CK_RV`.
#[derive(Debug)]
pub struct Error {
    ckrv: CK_RV,
    origin: Option<Box<dyn error::Error + Send + Sync>>,
    errmsg: Option<String>,
}

impl Error {
    /// Wraps a bare Cryptoki return value.
    pub fn ck_rv(ckrv: CK_RV) -> Error {
        Error {
            ckrv: ckrv,
            origin: None,
            errmsg: None,
        }
    }

    /// Wraps a Cryptoki return value, retaining the originating error.
    pub fn ck_rv_from_error<E>(ckrv: CK_RV, error: E) -> Error
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error {
            ckrv: ckrv,
            origin: Some(error.into()),
            errmsg: None,
        }
    }

    /// Wraps a Cryptoki return value with a context message.
    pub fn ck_rv_with_errmsg(ckrv: CK_RV, errmsg: String) -> Error {
        Error {
            ckrv: ckrv,
            origin: None,
            errmsg: Some(errmsg),
        }
    }

    /// The Cryptoki return value to surface to the caller.
    pub fn rv(&self) -> CK_RV {
        self.ckrv
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref e) = self.errmsg {
            return write!(f, "{}", e);
        }
        if let Some(ref e) = self.origin {
            return e.fmt(f);
        }
        match self.ckrv {
            CKR_GENERAL_ERROR => write!(f, "CKR_GENERAL_ERROR"),
            CKR_MECHANISM_INVALID => write!(f, "CKR_MECHANISM_INVALID"),
            CKR_KEY_TYPE_INCONSISTENT => {
                write!(f, "CKR_KEY_TYPE_INCONSISTENT")
            }
            CKR_BUFFER_TOO_SMALL => write!(f, "CKR_BUFFER_TOO_SMALL"),
            CKR_OPERATION_NOT_INITIALIZED => {
                write!(f, "CKR_OPERATION_NOT_INITIALIZED")
            }
            _ => write!(f, "CKR 0x{:08x}", self.ckrv),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.origin {
            Some(ref e) => Some(e.as_ref() as &(dyn error::Error + 'static)),
            None => None,
        }
    }
}

impl From<CK_RV> for Error {
    fn from(ckrv: CK_RV) -> Error {
        Error::ck_rv(ckrv)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::ck_rv_from_error(CKR_GENERAL_ERROR, error)
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(error: std::num::TryFromIntError) -> Error {
        Error::ck_rv_from_error(CKR_GENERAL_ERROR, error)
    }
}
