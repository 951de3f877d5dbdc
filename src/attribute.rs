// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Object attributes as raw Cryptoki value cells with typed accessors.
//! Values that carry key material are flagged so they get wiped when
//! the attribute is dropped or replaced.

use crate::error::{Error, Result};
use crate::pkcs11::*;

use zeroize::Zeroize;

const CK_ULONG_SIZE: usize = std::mem::size_of::<CK_ULONG>();

/// A single attribute: type code plus raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    ck_type: CK_ATTRIBUTE_TYPE,
    value: Vec<u8>,
    zeroize: bool,
}

impl Attribute {
    /// Builds a boolean attribute.
    pub fn from_bool(t: CK_ATTRIBUTE_TYPE, b: bool) -> Attribute {
        Attribute {
            ck_type: t,
            value: vec![if b { CK_TRUE } else { CK_FALSE }],
            zeroize: false,
        }
    }

    /// Builds a `CK_ULONG` attribute, stored in native byte order the
    /// way a Cryptoki template carries it.
    pub fn from_ulong(t: CK_ATTRIBUTE_TYPE, v: CK_ULONG) -> Attribute {
        Attribute {
            ck_type: t,
            value: v.to_ne_bytes().to_vec(),
            zeroize: false,
        }
    }

    /// Builds a byte-string attribute.
    pub fn from_bytes(t: CK_ATTRIBUTE_TYPE, v: &[u8]) -> Attribute {
        Attribute {
            ck_type: t,
            value: v.to_vec(),
            zeroize: false,
        }
    }

    /// Builds a byte-string attribute whose value is wiped on drop.
    pub fn from_bytes_sensitive(t: CK_ATTRIBUTE_TYPE, v: &[u8]) -> Attribute {
        Attribute {
            ck_type: t,
            value: v.to_vec(),
            zeroize: true,
        }
    }

    /// Builds a string attribute.
    pub fn from_string(t: CK_ATTRIBUTE_TYPE, v: &str) -> Attribute {
        Attribute {
            ck_type: t,
            value: v.as_bytes().to_vec(),
            zeroize: false,
        }
    }

    /// The attribute type code.
    pub fn get_type(&self) -> CK_ATTRIBUTE_TYPE {
        self.ck_type
    }

    /// The raw value bytes.
    pub fn get_value(&self) -> &Vec<u8> {
        &self.value
    }

    /// Interprets the value as a boolean.
    pub fn to_bool(&self) -> Result<bool> {
        if self.value.len() != 1 {
            return Err(Error::ck_rv(CKR_ATTRIBUTE_TYPE_INVALID));
        }
        Ok(self.value[0] != CK_FALSE)
    }

    /// Interprets the value as a `CK_ULONG`.
    pub fn to_ulong(&self) -> Result<CK_ULONG> {
        let bytes: [u8; CK_ULONG_SIZE] = match self.value.as_slice().try_into()
        {
            Ok(b) => b,
            Err(_) => return Err(Error::ck_rv(CKR_ATTRIBUTE_TYPE_INVALID)),
        };
        Ok(CK_ULONG::from_ne_bytes(bytes))
    }
}

impl Drop for Attribute {
    fn drop(&mut self) {
        if self.zeroize {
            self.value.zeroize();
        }
    }
}
