// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Hash-then-sign composition. A composite mechanism ("sign with X over
//! a hash produced by H") is synthesized from a raw signature
//! descriptor and a registered digest descriptor. When the key's token
//! can perform the composite natively, raw message bytes are
//! accumulated and handed over whole; otherwise a nested digest
//! operation runs in software and only its output reaches the token's
//! raw signature primitive. Verification always takes the software
//! path, recomputing the digest and checking the signature against the
//! exported public key material.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hash::MAX_DIGEST_SIZE;
use crate::mechanism::{
    Descriptor, HashSignatureInfo, MechData, Mechanism, Mechanisms,
    VerifyData,
};
use crate::object::Object;
use crate::operation::{can_do_gate, OpKind, Operation, OperationData};
use crate::pkcs11::*;

/* Composite mechanisms only ever sign or verify */
const HASH_SIGN_FLAGS: CK_FLAGS =
    CKF_SIGN | CKF_SIGN_RECOVER | CKF_VERIFY | CKF_VERIFY_RECOVER;

/// Registers a composite sign+hash mechanism derived from a raw
/// signature mechanism already registered for the token plus a software
/// digest mechanism. Fails with `CKR_MECHANISM_INVALID` when the digest
/// half is not registered.
pub fn register_sign_and_hash_mechanism(
    mechs: &mut Mechanisms,
    mech: CK_MECHANISM_TYPE,
    hash_mech: CK_MECHANISM_TYPE,
    sign_type: &Arc<Descriptor>,
) -> Result<()> {
    let hash_type = match mechs.find(hash_mech, CKF_DIGEST) {
        Some(h) => h,
        None => return Err(Error::ck_rv(CKR_MECHANISM_INVALID)),
    };

    let mut info = *sign_type.info();
    info.flags &= HASH_SIGN_FLAGS;

    let data = HashSignatureInfo {
        mech: mech,
        hash_mech: hash_mech,
        sign_mech: sign_type.mech(),
        hash_ref: hash_type,
    };
    let mt = Descriptor::new_composite_mechanism(
        mech,
        info,
        *sign_type.key_types(),
        data,
    );
    mechs.register(&mt)?;
    Ok(())
}

/// Derives the expected signature length from the key's attributes.
/// Key families outside the known set are rejected; there is no generic
/// fallback.
pub fn signature_size(key: &Object) -> Result<CK_ULONG> {
    let key_type = get_attribute_ulong(key, CKA_KEY_TYPE)?;
    match key_type {
        CKK_RSA => {
            let bits = get_attribute_ulong(key, CKA_MODULUS_BITS)?;
            Ok((bits + 7) / 8)
        }
        CKK_EC | CKK_EC_EDWARDS | CKK_EC_MONTGOMERY => {
            /* two field elements */
            let bits = get_attribute_ulong(key, CKA_MODULUS_BITS)?;
            Ok(((bits + 7) / 8) * 2)
        }
        CKK_GOSTR3410 => {
            let bits = get_attribute_ulong(key, CKA_MODULUS_BITS)?;
            Ok((bits + 7) / 8 * 2)
        }
        _ => Err(Error::ck_rv(CKR_MECHANISM_INVALID)),
    }
}

fn get_attribute_ulong(key: &Object, t: CK_ATTRIBUTE_TYPE) -> Result<CK_ULONG> {
    let value = key.ops().get_attribute(key, t)?;
    let bytes: [u8; std::mem::size_of::<CK_ULONG>()] =
        match value.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return Err(Error::ck_rv(CKR_ATTRIBUTE_TYPE_INVALID)),
        };
    Ok(CK_ULONG::from_ne_bytes(bytes))
}

impl Operation {
    /// Prepares a signature operation. The nested digest handle is
    /// instantiated only when the descriptor carries composition info
    /// and the token declined (or did not recognize) the composite
    /// mechanism.
    pub(crate) fn signature_init(&mut self, key: &Arc<Object>) -> Result<()> {
        let native = can_do_gate(key, self.descriptor().mech(), CKF_SIGN)?;

        /* the parameter validation hook runs regardless of the path */
        key.ops().init_params(key, self.mechanism())?;

        let descriptor = self.descriptor().clone();
        let mut data = OperationData::new(key.clone());
        if let MechData::HashSignature(info) = descriptor.mech_data() {
            if !native {
                let mut md = Operation::new(
                    OpKind::Digest,
                    info.hash_ref.clone(),
                    Mechanism::without_param(info.hash_mech),
                );
                md.md_init()?;
                data.md = Some(Box::new(md));
            }
        }
        self.set_key_data(data);
        Ok(())
    }

    /// Prepares a verification operation. The digest path is always
    /// instantiated when composition info is present; a missing
    /// software verification primitive means the verify half of this
    /// mechanism is not wired up.
    pub(crate) fn verify_init(
        &mut self,
        key: &Arc<Object>,
        verifier: Option<Arc<dyn VerifyData>>,
    ) -> Result<()> {
        let verifier = match verifier {
            Some(v) => v,
            None => return Err(Error::ck_rv(CKR_KEY_TYPE_INCONSISTENT)),
        };

        /* only hard errors matter here, verification never signs */
        can_do_gate(key, self.descriptor().mech(), CKF_VERIFY)?;

        key.ops().init_params(key, self.mechanism())?;

        let descriptor = self.descriptor().clone();
        let mut data = OperationData::new(key.clone());
        if let MechData::HashSignature(info) = descriptor.mech_data() {
            let mut md = Operation::new(
                OpKind::Digest,
                info.hash_ref.clone(),
                Mechanism::without_param(info.hash_mech),
            );
            md.md_init()?;
            data.md = Some(Box::new(md));
        }
        data.verifier = Some(verifier);
        self.set_key_data(data);
        Ok(())
    }

    /// Feeds message bytes: to the nested digest when hashing in
    /// software, otherwise into the raw accumulator.
    pub(crate) fn signature_update(&mut self, part: &[u8]) -> Result<()> {
        let data = self.key_data_mut()?;
        match &mut data.md {
            Some(md) => md.md_update(part),
            None => data.buffer.append(part),
        }
    }

    /// Finishes a signature. The pending digest, if any, is folded into
    /// the accumulator exactly once, so a sizing retry re-runs only the
    /// token's stateless raw-sign call over the same bytes.
    pub(crate) fn signature_final(
        &mut self,
        signature: Option<&mut [u8]>,
        signature_len: &mut CK_ULONG,
    ) -> Result<()> {
        let mech = self.mechanism().clone();
        let data = self.key_data_mut()?;

        if let Some(mut md) = data.md.take() {
            let hlen = md.digest_len()?;
            if hlen > MAX_DIGEST_SIZE {
                return Err(Error::ck_rv(CKR_FUNCTION_FAILED));
            }
            let mut hash = [0u8; MAX_DIGEST_SIZE];
            let n = match md.md_final(&mut hash[..hlen]) {
                Ok(n) => n,
                Err(e) if e.rv() == CKR_BUFFER_TOO_SMALL => {
                    return Err(Error::ck_rv(CKR_FUNCTION_FAILED))
                }
                Err(e) => return Err(e),
            };
            data.buffer.append(&hash[..n])?;
        }

        let key = data.key.clone();
        key.ops().sign(
            &key,
            &mech,
            data.buffer.as_slice(),
            signature,
            signature_len,
        )
    }

    /// Expected signature length, derived purely from key attributes.
    pub(crate) fn signature_size(&self, length: &mut CK_ULONG) -> Result<()> {
        let data = self.key_data()?;
        *length = signature_size(&data.key)?;
        Ok(())
    }

    /// Feeds verification data, mirroring [`Self::signature_update`].
    pub(crate) fn verify_update(&mut self, part: &[u8]) -> Result<()> {
        self.signature_update(part)
    }

    /// Finishes a verification: exports the public key material (plus
    /// domain parameters for key families that need them) and hands
    /// everything to the software verification primitive.
    pub(crate) fn verify_final(&mut self, signature: &[u8]) -> Result<()> {
        if signature.is_empty() {
            return Err(Error::ck_rv(CKR_ARGUMENTS_BAD));
        }
        let mech = self.mechanism().clone();
        let data = self.key_data_mut()?;
        let key = data.key.clone();

        let key_type = get_attribute_ulong(&key, CKA_KEY_TYPE)?;
        let (value_attr, params) = if key_type == CKK_GOSTR3410 {
            (CKA_VALUE, key.ops().get_attribute(&key, CKA_GOSTR3410_PARAMS)?)
        } else {
            (CKA_PUBLIC_KEY_INFO, Vec::new())
        };
        let pubkey = key.ops().get_attribute(&key, value_attr)?;

        let verifier = match &data.verifier {
            Some(v) => v.clone(),
            None => return Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        };
        verifier.verify_data(
            &pubkey,
            &params,
            &mech,
            data.md.as_deref_mut(),
            data.buffer.as_slice(),
            signature,
        )
    }
}
