// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! The public operation families. Every family follows the same
//! protocol: init resolves the mechanism under the family's capability
//! flag, validates the key type, installs the session handle and runs
//! the descriptor's init (uninstalling on failure); updates tear the
//! handle down on any error other than a sizing miss; terminal calls
//! honor the two-call sizing convention, where a length probe and an
//! undersized buffer both leave the operation alive for a retry.

use std::sync::Arc;

use crate::attribute::Attribute;
use crate::error::{Error, Result};
use crate::mechanism::{Descriptor, Mechanism};
use crate::object::Object;
use crate::operation::{OpKind, Operation};
use crate::pkcs11::*;
use crate::session::Session;
use crate::token::Token;

use zeroize::Zeroize;

fn resolve(
    token: &Token,
    kind: OpKind,
    mech: CK_MECHANISM_TYPE,
) -> Result<Arc<Descriptor>> {
    match token.mechanisms().find(mech, kind.required_flags()) {
        Some(mt) => Ok(mt),
        None => Err(Error::ck_rv(CKR_MECHANISM_INVALID)),
    }
}

/* Whether a terminal call leaves the operation alive: a successful
 * length probe does, and so does an undersized buffer; everything
 * else ends the operation. */
fn final_keeps_operation(probe: bool, res: &Result<()>) -> bool {
    match res {
        Ok(()) => probe,
        Err(e) => !probe && e.rv() == CKR_BUFFER_TOO_SMALL,
    }
}

/* ===== digest family ===== */

/// Starts a digest operation.
pub fn digest_init(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
) -> Result<()> {
    let mt = resolve(token, OpKind::Digest, mech.mech())?;
    log::debug!("digest init, mechanism 0x{:x}", mech.mech());
    session.start_operation(Operation::new(OpKind::Digest, mt, mech.clone()));
    let op = session.get_operation_mut(OpKind::Digest)?;
    let res = op.md_init();
    if res.is_err() {
        session.stop_operation(OpKind::Digest);
    }
    res
}

/// Feeds message bytes to the digest in flight.
pub fn digest_update(session: &mut Session, data: &[u8]) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Digest)?;
    let res = op.md_update(data);
    if res.is_err() {
        session.stop_operation(OpKind::Digest);
    }
    res
}

/// Finishes the digest. `None` probes the required length; an
/// undersized buffer reports `CKR_BUFFER_TOO_SMALL`; both leave the
/// operation alive.
pub fn digest_final(
    session: &mut Session,
    digest: Option<&mut [u8]>,
    digest_len: &mut CK_ULONG,
) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Digest)?;
    let size = match op.digest_len() {
        Ok(s) => s,
        Err(e) => {
            session.stop_operation(OpKind::Digest);
            return Err(e);
        }
    };
    match digest {
        None => {
            *digest_len = size as CK_ULONG;
            Ok(())
        }
        Some(buf) if buf.len() < size => {
            *digest_len = size as CK_ULONG;
            Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL))
        }
        Some(buf) => {
            let res = op.md_final(&mut buf[..size]);
            session.stop_operation(OpKind::Digest);
            let n = res?;
            *digest_len = n as CK_ULONG;
            Ok(())
        }
    }
}

/// One-shot digest over `data`, folding update and final into a single
/// call under the same sizing rules. Requires a prior
/// [`digest_init`]; sizing probes do not consume `data`.
pub fn digest(
    session: &mut Session,
    data: &[u8],
    digest: Option<&mut [u8]>,
    digest_len: &mut CK_ULONG,
) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Digest)?;
    let size = match op.digest_len() {
        Ok(s) => s,
        Err(e) => {
            session.stop_operation(OpKind::Digest);
            return Err(e);
        }
    };
    match digest {
        None => {
            *digest_len = size as CK_ULONG;
            Ok(())
        }
        Some(buf) if buf.len() < size => {
            *digest_len = size as CK_ULONG;
            Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL))
        }
        Some(buf) => {
            let res = match op.md_update(data) {
                Ok(()) => op.md_final(&mut buf[..size]),
                Err(e) => Err(e),
            };
            session.stop_operation(OpKind::Digest);
            let n = res?;
            *digest_len = n as CK_ULONG;
            Ok(())
        }
    }
}

/* ===== sign family ===== */

/// Starts a signature operation with `key`, whose declared type must be
/// accepted by the resolved mechanism.
pub fn sign_init(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
    key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
) -> Result<()> {
    log::debug!(
        "sign init, mechanism 0x{:x}, key type 0x{:x}",
        mech.mech(),
        key_type
    );
    let mt = resolve(token, OpKind::Sign, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Sign, mt, mech.clone()));
    let op = session.get_operation_mut(OpKind::Sign)?;
    let res = op.signature_init(key);
    if res.is_err() {
        session.stop_operation(OpKind::Sign);
    }
    res
}

/// Feeds message bytes to the signature in flight.
pub fn sign_update(session: &mut Session, data: &[u8]) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Sign)?;
    let res = op.signature_update(data);
    if res.is_err() {
        session.stop_operation(OpKind::Sign);
    }
    res
}

/// Finishes the signature under the two-call sizing convention.
pub fn sign_final(
    session: &mut Session,
    signature: Option<&mut [u8]>,
    signature_len: &mut CK_ULONG,
) -> Result<()> {
    let probe = signature.is_none();
    let op = session.get_operation_mut(OpKind::Sign)?;
    let res = op.signature_final(signature, signature_len);
    if !final_keeps_operation(probe, &res) {
        session.stop_operation(OpKind::Sign);
    }
    res
}

/// Expected signature length for the signature in flight, derived from
/// the key's attributes without touching the accumulated data.
pub fn sign_size(
    session: &mut Session,
    signature_len: &mut CK_ULONG,
) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Sign)?;
    let res = op.signature_size(signature_len);
    if res.is_err() {
        session.stop_operation(OpKind::Sign);
    }
    res
}

/* ===== verify family ===== */

/// Starts a verification operation with `key`.
pub fn verify_init(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
    key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
) -> Result<()> {
    log::debug!(
        "verify init, mechanism 0x{:x}, key type 0x{:x}",
        mech.mech(),
        key_type
    );
    let mt = resolve(token, OpKind::Verify, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Verify, mt, mech.clone()));
    let verifier = token.verify_provider();
    let op = session.get_operation_mut(OpKind::Verify)?;
    let res = op.verify_init(key, verifier);
    if res.is_err() {
        session.stop_operation(OpKind::Verify);
    }
    res
}

/// Feeds message bytes to the verification in flight.
pub fn verify_update(session: &mut Session, data: &[u8]) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Verify)?;
    let res = op.verify_update(data);
    if res.is_err() {
        session.stop_operation(OpKind::Verify);
    }
    res
}

/// Checks `signature` and ends the verification either way.
pub fn verify_final(session: &mut Session, signature: &[u8]) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Verify)?;
    let res = op.verify_final(signature);
    session.stop_operation(OpKind::Verify);
    res
}

/* ===== encrypt family ===== */

/// Starts an encryption operation with `key`.
pub fn encrypt_init(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
    key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
) -> Result<()> {
    let mt = resolve(token, OpKind::Encrypt, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Encrypt, mt, mech.clone()));
    let op = session.get_operation_mut(OpKind::Encrypt)?;
    let res = op.encrypt_init(key);
    if res.is_err() {
        session.stop_operation(OpKind::Encrypt);
    }
    res
}

/// One-shot encryption: a driver update plus the driver finalization,
/// with the summed output subject to the sizing convention.
pub fn encrypt(
    session: &mut Session,
    data: &[u8],
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let probe = out.is_none();
    let op = session.get_operation_mut(OpKind::Encrypt)?;
    let res = match out {
        None => {
            let mut n1: CK_ULONG = 0;
            let mut n2: CK_ULONG = 0;
            let r = match op.encrypt_update(data, None, &mut n1) {
                Ok(()) => op.encrypt_final(None, &mut n2),
                Err(e) => Err(e),
            };
            *out_len = n1 + n2;
            r
        }
        Some(buf) => {
            let mut n1: CK_ULONG = 0;
            match op.encrypt_update(data, Some(&mut buf[..]), &mut n1) {
                Ok(()) => {
                    let used = std::cmp::min(n1 as usize, buf.len());
                    let mut n2: CK_ULONG = 0;
                    let r = op.encrypt_final(Some(&mut buf[used..]), &mut n2);
                    *out_len = n1 + n2;
                    r
                }
                Err(e) => {
                    *out_len = n1;
                    Err(e)
                }
            }
        }
    };
    if !final_keeps_operation(probe, &res) {
        session.stop_operation(OpKind::Encrypt);
    }
    res
}

/// Encrypts one chunk. Only a sizing miss leaves the operation alive on
/// error.
pub fn encrypt_update(
    session: &mut Session,
    data: &[u8],
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Encrypt)?;
    let res = op.encrypt_update(data, out, out_len);
    match &res {
        Ok(()) => (),
        Err(e) if e.rv() == CKR_BUFFER_TOO_SMALL => (),
        Err(_) => session.stop_operation(OpKind::Encrypt),
    }
    res
}

/// Retrieves the final encryption output under the sizing convention.
pub fn encrypt_final(
    session: &mut Session,
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let probe = out.is_none();
    let op = session.get_operation_mut(OpKind::Encrypt)?;
    let res = op.encrypt_final(out, out_len);
    if !final_keeps_operation(probe, &res) {
        session.stop_operation(OpKind::Encrypt);
    }
    res
}

/* ===== decrypt family ===== */

/// Starts a decryption operation with `key`.
pub fn decrypt_init(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
    key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
) -> Result<()> {
    let mt = resolve(token, OpKind::Decrypt, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Decrypt, mt, mech.clone()));
    let op = session.get_operation_mut(OpKind::Decrypt)?;
    let res = op.decrypt_init(key);
    if res.is_err() {
        session.stop_operation(OpKind::Decrypt);
    }
    res
}

/// One-shot decryption, mirroring [`encrypt`].
pub fn decrypt(
    session: &mut Session,
    data: &[u8],
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let probe = out.is_none();
    let op = session.get_operation_mut(OpKind::Decrypt)?;
    let res = match out {
        None => {
            let mut n1: CK_ULONG = 0;
            let mut n2: CK_ULONG = 0;
            let r = match op.decrypt_update(data, None, &mut n1) {
                Ok(()) => op.decrypt_final(None, &mut n2),
                Err(e) => Err(e),
            };
            *out_len = n1 + n2;
            r
        }
        Some(buf) => {
            let mut n1: CK_ULONG = 0;
            match op.decrypt_update(data, Some(&mut buf[..]), &mut n1) {
                Ok(()) => {
                    let used = std::cmp::min(n1 as usize, buf.len());
                    let mut n2: CK_ULONG = 0;
                    let r = op.decrypt_final(Some(&mut buf[used..]), &mut n2);
                    *out_len = n1 + n2;
                    r
                }
                Err(e) => {
                    *out_len = n1;
                    Err(e)
                }
            }
        }
    };
    if !final_keeps_operation(probe, &res) {
        session.stop_operation(OpKind::Decrypt);
    }
    res
}

/// Decrypts one chunk. Only a sizing miss leaves the operation alive on
/// error.
pub fn decrypt_update(
    session: &mut Session,
    data: &[u8],
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let op = session.get_operation_mut(OpKind::Decrypt)?;
    let res = op.decrypt_update(data, out, out_len);
    match &res {
        Ok(()) => (),
        Err(e) if e.rv() == CKR_BUFFER_TOO_SMALL => (),
        Err(_) => session.stop_operation(OpKind::Decrypt),
    }
    res
}

/// Retrieves the final decryption output under the sizing convention.
pub fn decrypt_final(
    session: &mut Session,
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let probe = out.is_none();
    let op = session.get_operation_mut(OpKind::Decrypt)?;
    let res = op.decrypt_final(out, out_len);
    if !final_keeps_operation(probe, &res) {
        session.stop_operation(OpKind::Decrypt);
    }
    res
}

/* ===== derive / wrap / unwrap ===== */

/// Derives key material from `base_key`. The driver is probed for the
/// output length first; zero means the derived key stays token-side.
/// A returned value is attached to `derived_key` as its value attribute
/// and the local copy is wiped. The operation never outlives the call.
pub fn derive(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
    base_key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
    derived_key: &mut Object,
) -> Result<()> {
    let mt = resolve(token, OpKind::Derive, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Derive, mt, mech.clone()));
    let res = derive_data(mech, base_key, derived_key);
    session.stop_operation(OpKind::Derive);
    res
}

fn derive_data(
    mech: &Mechanism,
    base_key: &Arc<Object>,
    derived_key: &mut Object,
) -> Result<()> {
    let mut len: CK_ULONG = 0;
    base_key.ops().derive(base_key, mech, None, &mut len)?;

    let mut keybuf = vec![0u8; len as usize];
    let mut out_len = len;
    base_key
        .ops()
        .derive(base_key, mech, Some(keybuf.as_mut_slice()), &mut out_len)?;

    let n = std::cmp::min(out_len as usize, keybuf.len());
    if n > 0 {
        derived_key
            .set_attr(Attribute::from_bytes_sensitive(CKA_VALUE, &keybuf[..n]));
    }
    keybuf.zeroize();
    Ok(())
}

/// Wraps `target_key` under `wrapping_key`. One-shot: the operation
/// never outlives the call; output sizing is the driver's contract.
pub fn wrap(
    session: &mut Session,
    token: &Token,
    mech: &Mechanism,
    wrapping_key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
    target_key: &Object,
    out: Option<&mut [u8]>,
    out_len: &mut CK_ULONG,
) -> Result<()> {
    let mt = resolve(token, OpKind::Wrap, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Wrap, mt, mech.clone()));
    let res = wrapping_key.ops().wrap_key(
        wrapping_key,
        mech,
        target_key,
        out,
        out_len,
    );
    session.stop_operation(OpKind::Wrap);
    res
}

/// Unwraps `wrapped` with `unwrapping_key` and materializes the
/// recovered key as a new token-resident object, returning its handle.
/// A caller-requested session-only unwrap is not supported: the object
/// lands on the token regardless of the template's storage flag.
pub fn unwrap(
    session: &mut Session,
    token: &mut Token,
    mech: &Mechanism,
    unwrapping_key: &Arc<Object>,
    key_type: CK_KEY_TYPE,
    wrapped: &[u8],
    template: &[Attribute],
) -> Result<CK_OBJECT_HANDLE> {
    let mt = resolve(token, OpKind::Unwrap, mech.mech())?;
    mt.validate_key_type(key_type)?;
    session.start_operation(Operation::new(OpKind::Unwrap, mt, mech.clone()));
    let res = unwrapping_key.ops().unwrap_key(
        unwrapping_key,
        mech,
        wrapped,
        template,
    );
    session.stop_operation(OpKind::Unwrap);

    let mut obj = res?;
    obj.set_attr(Attribute::from_bool(CKA_TOKEN, true));
    token.add_object(obj)
}
