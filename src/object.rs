// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Key objects and the capability interface the engine drives them
//! through. An `Object` is a host-side record of a key; the actual
//! cryptographic primitives live behind its [`KeyOps`] driver, whether
//! the key sits on a hardware token or in software.

use std::fmt::Debug;
use std::sync::Arc;

use crate::attribute::Attribute;
use crate::error::{Error, Result};
use crate::mechanism::Mechanism;
use crate::pkcs11::*;

/// A key object: identity, attribute store and driver.
#[derive(Debug, Clone)]
pub struct Object {
    handle: CK_OBJECT_HANDLE,
    class: CK_OBJECT_CLASS,
    attributes: Vec<Attribute>,
    ops: Arc<dyn KeyOps>,
}

impl Object {
    /// Creates an object of the given class, bound to a driver.
    pub fn new(class: CK_OBJECT_CLASS, ops: Arc<dyn KeyOps>) -> Object {
        Object {
            handle: CK_INVALID_HANDLE,
            class: class,
            attributes: Vec::new(),
            ops: ops,
        }
    }

    /// The runtime handle, `CK_INVALID_HANDLE` until the object is
    /// inserted into a token.
    pub fn handle(&self) -> CK_OBJECT_HANDLE {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: CK_OBJECT_HANDLE) {
        self.handle = handle;
    }

    /// The object class.
    pub fn class(&self) -> CK_OBJECT_CLASS {
        self.class
    }

    /// The driver this object performs primitives through.
    pub fn ops(&self) -> &dyn KeyOps {
        self.ops.as_ref()
    }

    /// Looks up an attribute by type.
    pub fn get_attr(&self, t: CK_ATTRIBUTE_TYPE) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.get_type() == t)
    }

    /// Returns an attribute value as bytes.
    pub fn get_attr_as_bytes(&self, t: CK_ATTRIBUTE_TYPE) -> Result<&Vec<u8>> {
        match self.get_attr(t) {
            Some(a) => Ok(a.get_value()),
            None => Err(Error::ck_rv(CKR_ATTRIBUTE_TYPE_INVALID)),
        }
    }

    /// Returns an attribute value as a `CK_ULONG`.
    pub fn get_attr_as_ulong(&self, t: CK_ATTRIBUTE_TYPE) -> Result<CK_ULONG> {
        match self.get_attr(t) {
            Some(a) => a.to_ulong(),
            None => Err(Error::ck_rv(CKR_ATTRIBUTE_TYPE_INVALID)),
        }
    }

    /// Returns a boolean attribute, or `def` when absent.
    pub fn get_attr_as_bool(&self, t: CK_ATTRIBUTE_TYPE, def: bool) -> bool {
        match self.get_attr(t) {
            Some(a) => a.to_bool().unwrap_or(def),
            None => def,
        }
    }

    /// Sets an attribute, replacing any previous value of the same type.
    pub fn set_attr(&mut self, attr: Attribute) {
        let t = attr.get_type();
        match self.attributes.iter_mut().find(|a| a.get_type() == t) {
            Some(slot) => *slot = attr,
            None => self.attributes.push(attr),
        }
    }

    /// The declared key type, `CK_UNAVAILABLE_INFORMATION` when the
    /// object does not carry one.
    pub fn key_type(&self) -> CK_KEY_TYPE {
        match self.get_attr_as_ulong(CKA_KEY_TYPE) {
            Ok(kt) => kt,
            Err(_) => CK_UNAVAILABLE_INFORMATION,
        }
    }

    /// Whether the object is token-resident.
    pub fn is_token(&self) -> bool {
        self.get_attr_as_bool(CKA_TOKEN, false)
    }
}

/// Capability interface every key driver implements. The default method
/// bodies are the "slot unset" state: the engine treats
/// `CKR_FUNCTION_NOT_SUPPORTED` from `can_do` as "fall back to software
/// composition" and from anything else as "this key cannot do that".
///
/// Methods that produce output take an optional output slice plus an
/// in-out length and implement the standard sizing convention: `None`
/// reports the required length, a short buffer reports
/// `CKR_BUFFER_TOO_SMALL` together with the required length.
pub trait KeyOps: Debug + Send + Sync {
    /// Asks whether the token can natively perform `mech` for the
    /// given operation flags on this key.
    fn can_do(
        &self,
        _key: &Object,
        _mech: CK_MECHANISM_TYPE,
        _flags: CK_FLAGS,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Validates mechanism parameters before an operation starts.
    fn init_params(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Ok(())
    }

    /// Signs `data` exactly as presented (any hashing already happened,
    /// unless the mechanism was accepted natively via [`Self::can_do`]).
    fn sign(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _data: &[u8],
        _signature: Option<&mut [u8]>,
        _signature_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Checks `signature` over `data` natively. The engine's verify
    /// family does not use this: verification runs in software against
    /// exported public key material. The hook exists for embedders that
    /// drive a token's own verify primitive directly.
    fn verify(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _data: &[u8],
        _signature: &[u8],
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Prepares a streaming encryption with this key.
    fn encrypt_init(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Encrypts one chunk.
    fn encrypt_update(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _data: &[u8],
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Produces the final encryption output, if any.
    fn encrypt_final(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Prepares a streaming decryption with this key.
    fn decrypt_init(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Decrypts one chunk.
    fn decrypt_update(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _data: &[u8],
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Produces the final decryption output, if any.
    fn decrypt_final(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Derives key material from this key. A reported length of zero
    /// means the derived key stays token-side.
    fn derive(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Wraps `target` under this key.
    fn wrap_key(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _target: &Object,
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Unwraps `wrapped` with this key and returns the recovered key
    /// object, built from `template`.
    fn unwrap_key(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _wrapped: &[u8],
        _template: &[Attribute],
    ) -> Result<Object> {
        Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
    }

    /// Fetches an attribute value. The default reads the host-side
    /// attribute store; card drivers may go to the token instead.
    fn get_attribute(
        &self,
        key: &Object,
        t: CK_ATTRIBUTE_TYPE,
    ) -> Result<Vec<u8>> {
        Ok(key.get_attr_as_bytes(t)?.clone())
    }
}
