// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Per-session operation handles. A handle binds one operation kind to
//! the descriptor it was resolved against, an owned copy of the
//! mechanism request, and descriptor-defined private state. Handles are
//! created by the family's init dispatch, advanced by updates and torn
//! down by the terminal call, a fatal error or session teardown.

use std::sync::Arc;

use crate::buffer::SecureBuffer;
use crate::error::{Error, Result};
use crate::mechanism::{Descriptor, Digest, Mechanism, VerifyData};
use crate::object::Object;
use crate::pkcs11::*;

/// The eight operation families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Message digesting.
    Digest,
    /// Signature generation.
    Sign,
    /// Signature verification.
    Verify,
    /// Encryption.
    Encrypt,
    /// Decryption.
    Decrypt,
    /// Key derivation.
    Derive,
    /// Key wrapping.
    Wrap,
    /// Key unwrapping.
    Unwrap,
}

impl OpKind {
    /// Number of operation kinds; sizes the per-session handle table.
    pub const COUNT: usize = 8;

    pub(crate) fn idx(self) -> usize {
        self as usize
    }

    /// The capability flag a mechanism must carry to serve this family.
    pub fn required_flags(self) -> CK_FLAGS {
        match self {
            OpKind::Digest => CKF_DIGEST,
            OpKind::Sign => CKF_SIGN,
            OpKind::Verify => CKF_VERIFY,
            OpKind::Encrypt => CKF_ENCRYPT,
            OpKind::Decrypt => CKF_DECRYPT,
            OpKind::Derive => CKF_DERIVE,
            OpKind::Wrap => CKF_WRAP,
            OpKind::Unwrap => CKF_UNWRAP,
        }
    }
}

/// Private state of a key-backed operation. Updates feed exactly one of
/// the nested digest handle or the raw accumulator; which one is
/// decided once, at init time.
#[derive(Debug)]
pub(crate) struct OperationData {
    /// The key performing (or being verified against) the operation.
    pub key: Arc<Object>,
    /// Nested digest handle when hashing happens in software.
    pub md: Option<Box<Operation>>,
    /// Raw data accumulator for primitives that cannot stream.
    pub buffer: SecureBuffer,
    /// Software verification primitive, captured at verify-init.
    pub verifier: Option<Arc<dyn VerifyData>>,
}

impl OperationData {
    pub fn new(key: Arc<Object>) -> OperationData {
        OperationData {
            key: key,
            md: None,
            buffer: SecureBuffer::new(),
            verifier: None,
        }
    }
}

/// Descriptor-defined operation state.
#[derive(Debug)]
pub(crate) enum OpState {
    /// Not yet initialized (or a family that keeps no state).
    Empty,
    /// An in-flight digest computation.
    Digest(Box<dyn Digest>),
    /// A key-backed operation.
    Key(OperationData),
}

/// One in-flight operation of one kind on one session.
#[derive(Debug)]
pub struct Operation {
    kind: OpKind,
    descriptor: Arc<Descriptor>,
    mechanism: Mechanism,
    state: OpState,
}

impl Operation {
    /// Creates an uninitialized handle bound to a resolved descriptor.
    pub fn new(
        kind: OpKind,
        descriptor: Arc<Descriptor>,
        mechanism: Mechanism,
    ) -> Operation {
        Operation {
            kind: kind,
            descriptor: descriptor,
            mechanism: mechanism,
            state: OpState::Empty,
        }
    }

    /// The operation family this handle serves.
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// The descriptor the handle is bound to.
    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// The copied mechanism request.
    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    pub(crate) fn key_data(&self) -> Result<&OperationData> {
        match &self.state {
            OpState::Key(d) => Ok(d),
            _ => Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        }
    }

    pub(crate) fn key_data_mut(&mut self) -> Result<&mut OperationData> {
        match &mut self.state {
            OpState::Key(d) => Ok(d),
            _ => Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        }
    }

    pub(crate) fn set_key_data(&mut self, data: OperationData) {
        self.state = OpState::Key(data);
    }

    /* digest family */

    /// Instantiates the digest state from the descriptor's factory.
    pub(crate) fn md_init(&mut self) -> Result<()> {
        let factory = match self.descriptor.digest_factory() {
            Some(f) => f,
            None => return Err(Error::ck_rv(CKR_MECHANISM_INVALID)),
        };
        self.state = OpState::Digest(factory.digest_new(&self.mechanism)?);
        Ok(())
    }

    /// Feeds message bytes to the digest state.
    pub(crate) fn md_update(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            OpState::Digest(d) => d.digest_update(data),
            _ => Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        }
    }

    /// Output size of the digest in flight.
    pub(crate) fn digest_len(&self) -> Result<usize> {
        match &self.state {
            OpState::Digest(d) => d.digest_len(),
            _ => Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        }
    }

    /// Commit half of the digest query/commit pair: writes the digest
    /// into an adequately sized buffer.
    pub(crate) fn md_final(&mut self, digest: &mut [u8]) -> Result<usize> {
        match &mut self.state {
            OpState::Digest(d) => d.digest_final(digest),
            _ => Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        }
    }

    /* encryption/decryption families */

    /// Prepares an encryption: capability gate, parameter validation,
    /// then the driver's init call.
    pub(crate) fn encrypt_init(&mut self, key: &Arc<Object>) -> Result<()> {
        can_do_gate(key, self.descriptor.mech(), CKF_ENCRYPT)?;
        key.ops().init_params(key, &self.mechanism)?;
        key.ops().encrypt_init(key, &self.mechanism)?;
        self.state = OpState::Key(OperationData::new(key.clone()));
        Ok(())
    }

    /// Prepares a decryption, mirroring [`Self::encrypt_init`].
    pub(crate) fn decrypt_init(&mut self, key: &Arc<Object>) -> Result<()> {
        can_do_gate(key, self.descriptor.mech(), CKF_DECRYPT)?;
        key.ops().init_params(key, &self.mechanism)?;
        key.ops().decrypt_init(key, &self.mechanism)?;
        self.state = OpState::Key(OperationData::new(key.clone()));
        Ok(())
    }

    /// Encrypts one chunk through the driver.
    pub(crate) fn encrypt_update(
        &mut self,
        data: &[u8],
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        let mech = &self.mechanism;
        let d = match &self.state {
            OpState::Key(d) => d,
            _ => return Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        };
        d.key.ops().encrypt_update(&d.key, mech, data, out, out_len)
    }

    /// Retrieves the final encryption output through the driver.
    pub(crate) fn encrypt_final(
        &mut self,
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        let mech = &self.mechanism;
        let d = match &self.state {
            OpState::Key(d) => d,
            _ => return Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        };
        d.key.ops().encrypt_final(&d.key, mech, out, out_len)
    }

    /// Decrypts one chunk through the driver.
    pub(crate) fn decrypt_update(
        &mut self,
        data: &[u8],
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        let mech = &self.mechanism;
        let d = match &self.state {
            OpState::Key(d) => d,
            _ => return Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        };
        d.key.ops().decrypt_update(&d.key, mech, data, out, out_len)
    }

    /// Retrieves the final decryption output through the driver.
    pub(crate) fn decrypt_final(
        &mut self,
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        let mech = &self.mechanism;
        let d = match &self.state {
            OpState::Key(d) => d,
            _ => return Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        };
        d.key.ops().decrypt_final(&d.key, mech, out, out_len)
    }
}

/// Asks the key driver whether it can natively perform `mech`.
/// `Ok(true)` means the native path is available, `Ok(false)` means the
/// driver does not recognize the mechanism and software composition
/// should take over; any other driver error is fatal.
pub(crate) fn can_do_gate(
    key: &Object,
    mech: CK_MECHANISM_TYPE,
    flags: CK_FLAGS,
) -> Result<bool> {
    match key.ops().can_do(key, mech, flags) {
        Ok(()) => Ok(true),
        Err(e) if e.rv() == CKR_FUNCTION_NOT_SUPPORTED => Ok(false),
        Err(e) => Err(e),
    }
}
