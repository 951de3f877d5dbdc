// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::sync::Arc;

use crate::attribute::Attribute;
use crate::error::{Error, Result};
use crate::hash;
use crate::mechanism::{Descriptor, Mechanism, VerifyData};
use crate::object::{KeyOps, Object};
use crate::operation::Operation;
use crate::pkcs11::*;
use crate::session::Session;
use crate::signature::{register_sign_and_hash_mechanism, signature_size};
use crate::token::Token;

use constant_time_eq::constant_time_eq;
use sha2::Digest as _;
use sha2::Sha256;

/* Deterministic keyed construction standing in for the card's
 * signature primitive: a key is its seed, a signature is a keyed tag
 * expanded to the length the real key family would produce. */

pub fn tag(seed: &[u8], mech: CK_MECHANISM_TYPE, data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(seed);
    h.update(mech.to_le_bytes());
    h.update(data);
    h.finalize().into()
}

pub fn expand(tag: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut ctr: u32 = 0;
    while out.len() < len {
        let mut h = Sha256::new();
        h.update(tag);
        h.update(ctr.to_le_bytes());
        out.extend_from_slice(&h.finalize());
        ctr += 1;
    }
    out.truncate(len);
    out
}

fn keystream(key: &Object, mech: &Mechanism, len: usize) -> Result<Vec<u8>> {
    let seed = key.get_attr_as_bytes(CKA_VALUE)?;
    Ok(expand(&tag(seed, mech.mech(), b"pad"), len))
}

fn sha256_composite(mech: CK_MECHANISM_TYPE) -> bool {
    mech == CKM_SHA256_RSA_PKCS || mech == CKM_ECDSA_SHA256
}

/* Emulates the card side: signs what it is given, streams a toy xor
 * cipher, derives and wraps by seed expansion. When `native` is set the
 * driver claims the sha256 based composite mechanisms and performs the
 * hashing itself over the raw message it then receives. */
#[derive(Debug, Default)]
pub struct SoftKeyOps {
    pub native: bool,
}

impl SoftKeyOps {
    pub fn new() -> Arc<SoftKeyOps> {
        Arc::new(SoftKeyOps { native: false })
    }

    pub fn native() -> Arc<SoftKeyOps> {
        Arc::new(SoftKeyOps { native: true })
    }
}

impl KeyOps for SoftKeyOps {
    fn can_do(
        &self,
        _key: &Object,
        mech: CK_MECHANISM_TYPE,
        _flags: CK_FLAGS,
    ) -> Result<()> {
        if self.native && sha256_composite(mech) {
            Ok(())
        } else {
            Err(Error::ck_rv(CKR_FUNCTION_NOT_SUPPORTED))
        }
    }

    fn sign(
        &self,
        key: &Object,
        mech: &Mechanism,
        data: &[u8],
        signature: Option<&mut [u8]>,
        signature_len: &mut CK_ULONG,
    ) -> Result<()> {
        let n = usize::try_from(signature_size(key)?)?;
        let buf = match signature {
            None => {
                *signature_len = n as CK_ULONG;
                return Ok(());
            }
            Some(buf) => buf,
        };
        if buf.len() < n {
            *signature_len = n as CK_ULONG;
            return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
        }
        let seed = key.get_attr_as_bytes(CKA_VALUE)?;
        let digest = if self.native && sha256_composite(mech.mech()) {
            Sha256::digest(data).to_vec()
        } else {
            data.to_vec()
        };
        let sig = expand(&tag(seed, mech.mech(), &digest), n);
        buf[..n].copy_from_slice(&sig);
        *signature_len = n as CK_ULONG;
        Ok(())
    }

    fn encrypt_init(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Ok(())
    }

    fn encrypt_update(
        &self,
        key: &Object,
        mech: &Mechanism,
        data: &[u8],
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        let n = data.len();
        let buf = match out {
            None => {
                *out_len = n as CK_ULONG;
                return Ok(());
            }
            Some(buf) => buf,
        };
        if buf.len() < n {
            *out_len = n as CK_ULONG;
            return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
        }
        let pad = keystream(key, mech, n)?;
        for i in 0..n {
            buf[i] = data[i] ^ pad[i];
        }
        *out_len = n as CK_ULONG;
        Ok(())
    }

    fn encrypt_final(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        *out_len = 0;
        Ok(())
    }

    fn decrypt_init(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Ok(())
    }

    fn decrypt_update(
        &self,
        key: &Object,
        mech: &Mechanism,
        data: &[u8],
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        /* the toy cipher is an involution */
        self.encrypt_update(key, mech, data, out, out_len)
    }

    fn decrypt_final(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        *out_len = 0;
        Ok(())
    }

    fn derive(
        &self,
        key: &Object,
        mech: &Mechanism,
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        /* an empty parameter means the derived key stays on the card */
        let n: usize = if mech.param().is_empty() { 0 } else { 32 };
        let buf = match out {
            None => {
                *out_len = n as CK_ULONG;
                return Ok(());
            }
            Some(buf) => buf,
        };
        if n > 0 {
            if buf.len() < n {
                *out_len = n as CK_ULONG;
                return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
            }
            let seed = key.get_attr_as_bytes(CKA_VALUE)?;
            let dkm = expand(&tag(seed, mech.mech(), mech.param()), n);
            buf[..n].copy_from_slice(&dkm);
        }
        *out_len = n as CK_ULONG;
        Ok(())
    }

    fn wrap_key(
        &self,
        key: &Object,
        mech: &Mechanism,
        target: &Object,
        out: Option<&mut [u8]>,
        out_len: &mut CK_ULONG,
    ) -> Result<()> {
        let value = target.get_attr_as_bytes(CKA_VALUE)?.clone();
        let n = value.len();
        let buf = match out {
            None => {
                *out_len = n as CK_ULONG;
                return Ok(());
            }
            Some(buf) => buf,
        };
        if buf.len() < n {
            *out_len = n as CK_ULONG;
            return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
        }
        let pad = keystream(key, mech, n)?;
        for i in 0..n {
            buf[i] = value[i] ^ pad[i];
        }
        *out_len = n as CK_ULONG;
        Ok(())
    }

    fn unwrap_key(
        &self,
        key: &Object,
        mech: &Mechanism,
        wrapped: &[u8],
        template: &[Attribute],
    ) -> Result<Object> {
        let pad = keystream(key, mech, wrapped.len())?;
        let value: Vec<u8> =
            wrapped.iter().zip(pad.iter()).map(|(c, p)| c ^ p).collect();
        let mut obj = Object::new(CKO_SECRET_KEY, SoftKeyOps::new());
        obj.set_attr(Attribute::from_ulong(CKA_KEY_TYPE, CKK_AES));
        obj.set_attr(Attribute::from_bytes_sensitive(CKA_VALUE, &value));
        for attr in template {
            obj.set_attr(attr.clone());
        }
        Ok(obj)
    }
}

/* A driver whose streaming calls blow up, to exercise the fatal-update
 * teardown path. */
#[derive(Debug)]
pub struct FailingKeyOps;

impl KeyOps for FailingKeyOps {
    fn encrypt_init(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Ok(())
    }

    fn encrypt_update(
        &self,
        _key: &Object,
        _mech: &Mechanism,
        _data: &[u8],
        _out: Option<&mut [u8]>,
        _out_len: &mut CK_ULONG,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_FUNCTION_FAILED))
    }

    fn decrypt_init(&self, _key: &Object, _mech: &Mechanism) -> Result<()> {
        Ok(())
    }
}

/* A driver that recognizes every mechanism but refuses them all. */
#[derive(Debug)]
pub struct RejectingKeyOps;

impl KeyOps for RejectingKeyOps {
    fn can_do(
        &self,
        _key: &Object,
        _mech: CK_MECHANISM_TYPE,
        _flags: CK_FLAGS,
    ) -> Result<()> {
        Err(Error::ck_rv(CKR_DEVICE_ERROR))
    }
}

/* Verification side of the keyed construction: recompute the tag from
 * the exported public value and compare in constant time. */
#[derive(Debug)]
pub struct SoftVerifier;

impl VerifyData for SoftVerifier {
    fn verify_data(
        &self,
        pubkey: &[u8],
        _key_params: &[u8],
        mech: &Mechanism,
        md: Option<&mut Operation>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let digest = match md {
            Some(op) => {
                let len = op.digest_len()?;
                let mut buf = vec![0u8; len];
                let n = op.md_final(&mut buf)?;
                buf.truncate(n);
                buf
            }
            None => data.to_vec(),
        };
        let expected = expand(&tag(pubkey, mech.mech(), &digest), signature.len());
        if constant_time_eq(&expected, signature) {
            Ok(())
        } else {
            Err(Error::ck_rv(CKR_SIGNATURE_INVALID))
        }
    }
}

pub fn make_key(
    class: CK_OBJECT_CLASS,
    key_type: CK_KEY_TYPE,
    seed: &[u8],
    ops: Arc<dyn KeyOps>,
) -> Object {
    let mut o = Object::new(class, ops);
    o.set_attr(Attribute::from_ulong(CKA_KEY_TYPE, key_type));
    o.set_attr(Attribute::from_bytes_sensitive(CKA_VALUE, seed));
    o.set_attr(Attribute::from_bytes(CKA_PUBLIC_KEY_INFO, seed));
    o
}

pub fn rsa_key(bits: CK_ULONG, seed: &[u8]) -> Arc<Object> {
    let mut o = make_key(CKO_PRIVATE_KEY, CKK_RSA, seed, SoftKeyOps::new());
    o.set_attr(Attribute::from_ulong(CKA_MODULUS_BITS, bits));
    Arc::new(o)
}

pub fn rsa_key_native(bits: CK_ULONG, seed: &[u8]) -> Arc<Object> {
    let mut o = make_key(CKO_PRIVATE_KEY, CKK_RSA, seed, SoftKeyOps::native());
    o.set_attr(Attribute::from_ulong(CKA_MODULUS_BITS, bits));
    Arc::new(o)
}

pub fn ec_key(bits: CK_ULONG, seed: &[u8]) -> Arc<Object> {
    let mut o = make_key(CKO_PRIVATE_KEY, CKK_EC, seed, SoftKeyOps::new());
    o.set_attr(Attribute::from_ulong(CKA_MODULUS_BITS, bits));
    Arc::new(o)
}

pub fn gost_key(seed: &[u8]) -> Arc<Object> {
    let mut o =
        make_key(CKO_PRIVATE_KEY, CKK_GOSTR3410, seed, SoftKeyOps::new());
    o.set_attr(Attribute::from_ulong(CKA_MODULUS_BITS, 256));
    o.set_attr(Attribute::from_bytes(
        CKA_GOSTR3410_PARAMS,
        &[0x06, 0x07, 0x2a, 0x85, 0x03, 0x02, 0x02, 0x23, 0x01],
    ));
    Arc::new(o)
}

pub fn aes_key(seed: &[u8]) -> Arc<Object> {
    Arc::new(make_key(CKO_SECRET_KEY, CKK_AES, seed, SoftKeyOps::new()))
}

pub struct TestToken {
    pub token: Token,
    pub session: Session,
}

impl TestToken {
    /// A token with the software hashes, a card-style mechanism set and
    /// the composed sign-with-hash variants registered.
    pub fn initialized() -> TestToken {
        crate::log::trace_init();

        let mut token = Token::new("MEKHANE TEST TOKEN");
        hash::register(token.mechanisms_mut()).unwrap();

        let rsa = token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_RSA_PKCS,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 1024,
                    ulMaxKeySize: 4096,
                    flags: CKF_SIGN
                        | CKF_VERIFY
                        | CKF_ENCRYPT
                        | CKF_DECRYPT,
                },
                CKK_RSA,
            ))
            .unwrap();
        register_sign_and_hash_mechanism(
            token.mechanisms_mut(),
            CKM_SHA1_RSA_PKCS,
            CKM_SHA_1,
            &rsa,
        )
        .unwrap();
        register_sign_and_hash_mechanism(
            token.mechanisms_mut(),
            CKM_SHA256_RSA_PKCS,
            CKM_SHA256,
            &rsa,
        )
        .unwrap();

        let ecdsa = token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_ECDSA,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 256,
                    ulMaxKeySize: 521,
                    flags: CKF_SIGN | CKF_VERIFY,
                },
                CKK_EC,
            ))
            .unwrap();
        register_sign_and_hash_mechanism(
            token.mechanisms_mut(),
            CKM_ECDSA_SHA256,
            CKM_SHA256,
            &ecdsa,
        )
        .unwrap();

        token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_GOSTR3410,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 256,
                    ulMaxKeySize: 512,
                    flags: CKF_SIGN | CKF_VERIFY,
                },
                CKK_GOSTR3410,
            ))
            .unwrap();

        token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_AES_CBC,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 128,
                    ulMaxKeySize: 256,
                    flags: CKF_ENCRYPT | CKF_DECRYPT,
                },
                CKK_AES,
            ))
            .unwrap();
        token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_AES_KEY_WRAP,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 128,
                    ulMaxKeySize: 256,
                    flags: CKF_WRAP | CKF_UNWRAP,
                },
                CKK_AES,
            ))
            .unwrap();
        token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_AES_CMAC,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 128,
                    ulMaxKeySize: 256,
                    flags: CKF_SIGN | CKF_VERIFY,
                },
                CKK_AES,
            ))
            .unwrap();
        token
            .register_mechanism(&Descriptor::new_token_mechanism(
                CKM_ECDH1_DERIVE,
                CK_MECHANISM_INFO {
                    ulMinKeySize: 256,
                    ulMaxKeySize: 521,
                    flags: CKF_DERIVE,
                },
                CKK_EC,
            ))
            .unwrap();

        token.set_verify_provider(Arc::new(SoftVerifier));

        TestToken {
            token: token,
            session: Session::new(),
        }
    }
}
