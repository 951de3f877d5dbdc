// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Software digest mechanisms. These back the digest operation family
//! directly and provide the hash half of composed sign-with-hash
//! mechanisms when the token itself cannot hash.

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mechanism::Digest as _;
use crate::mechanism::{Descriptor, DigestInit, Mechanism, Mechanisms};
use crate::pkcs11::*;

use sha1::Sha1;
use sha2::Digest as _;
use sha2::{Sha224, Sha256, Sha384, Sha512};

/// Sentinel for "not a registered hash mechanism".
pub const INVALID_HASH_SIZE: usize = CK_UNAVAILABLE_INFORMATION as usize;

/// Largest digest any supported hash produces. Composition folds
/// digests into a buffer of this size.
pub const MAX_DIGEST_SIZE: usize = 64;

/// One entry of the supported hash table.
#[derive(Debug)]
pub struct HashSpec {
    /// Digest mechanism identifier.
    pub mech: CK_MECHANISM_TYPE,
    /// Configuration name.
    pub name: &'static str,
    /// Digest output size in bytes.
    pub hash_size: usize,
}

/// The hash mechanisms this build can provide in software.
pub static HASH_MECH_SET: [HashSpec; 5] = [
    HashSpec {
        mech: CKM_SHA_1,
        name: "sha1",
        hash_size: 20,
    },
    HashSpec {
        mech: CKM_SHA224,
        name: "sha224",
        hash_size: 28,
    },
    HashSpec {
        mech: CKM_SHA256,
        name: "sha256",
        hash_size: 32,
    },
    HashSpec {
        mech: CKM_SHA384,
        name: "sha384",
        hash_size: 48,
    },
    HashSpec {
        mech: CKM_SHA512,
        name: "sha512",
        hash_size: 64,
    },
];

/// Whether `hash` is one of the supported digest mechanisms.
pub fn is_valid_hash(hash: CK_MECHANISM_TYPE) -> bool {
    HASH_MECH_SET.iter().any(|hs| hs.mech == hash)
}

/// Digest size for `hash`, or [`INVALID_HASH_SIZE`].
pub fn hash_size(hash: CK_MECHANISM_TYPE) -> usize {
    for hs in &HASH_MECH_SET {
        if hs.mech == hash {
            return hs.hash_size;
        }
    }
    INVALID_HASH_SIZE
}

#[derive(Debug)]
enum HashState {
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// An in-flight software digest computation.
#[derive(Debug)]
pub struct HashOperation {
    state: HashState,
    finalized: bool,
}

impl HashOperation {
    /// Instantiates the hasher for a digest mechanism.
    pub fn new(mech: CK_MECHANISM_TYPE) -> Result<HashOperation> {
        let state = match mech {
            CKM_SHA_1 => HashState::Sha1(Sha1::new()),
            CKM_SHA224 => HashState::Sha224(Sha224::new()),
            CKM_SHA256 => HashState::Sha256(Sha256::new()),
            CKM_SHA384 => HashState::Sha384(Sha384::new()),
            CKM_SHA512 => HashState::Sha512(Sha512::new()),
            _ => return Err(Error::ck_rv(CKR_MECHANISM_INVALID)),
        };
        Ok(HashOperation {
            state: state,
            finalized: false,
        })
    }
}

impl crate::mechanism::Digest for HashOperation {
    fn digest_update(&mut self, data: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::ck_rv(CKR_OPERATION_NOT_INITIALIZED));
        }
        match &mut self.state {
            HashState::Sha1(h) => h.update(data),
            HashState::Sha224(h) => h.update(data),
            HashState::Sha256(h) => h.update(data),
            HashState::Sha384(h) => h.update(data),
            HashState::Sha512(h) => h.update(data),
        }
        Ok(())
    }

    fn digest_final(&mut self, digest: &mut [u8]) -> Result<usize> {
        if self.finalized {
            return Err(Error::ck_rv(CKR_OPERATION_NOT_INITIALIZED));
        }
        let size = self.digest_len()?;
        if digest.len() < size {
            return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
        }
        match &mut self.state {
            HashState::Sha1(h) => {
                digest[..size].copy_from_slice(h.finalize_reset().as_slice())
            }
            HashState::Sha224(h) => {
                digest[..size].copy_from_slice(h.finalize_reset().as_slice())
            }
            HashState::Sha256(h) => {
                digest[..size].copy_from_slice(h.finalize_reset().as_slice())
            }
            HashState::Sha384(h) => {
                digest[..size].copy_from_slice(h.finalize_reset().as_slice())
            }
            HashState::Sha512(h) => {
                digest[..size].copy_from_slice(h.finalize_reset().as_slice())
            }
        }
        self.finalized = true;
        Ok(size)
    }

    fn digest_len(&self) -> Result<usize> {
        let size = match &self.state {
            HashState::Sha1(_) => 20,
            HashState::Sha224(_) => 28,
            HashState::Sha256(_) => 32,
            HashState::Sha384(_) => 48,
            HashState::Sha512(_) => 64,
        };
        Ok(size)
    }
}

#[derive(Debug)]
struct SoftDigestFactory;

impl DigestInit for SoftDigestFactory {
    fn digest_new(
        &self,
        mech: &Mechanism,
    ) -> Result<Box<dyn crate::mechanism::Digest>> {
        Ok(Box::new(HashOperation::new(mech.mech())?))
    }
}

/// Registers every supported software digest mechanism.
pub fn register(mechs: &mut Mechanisms) -> Result<()> {
    let factory: Arc<dyn DigestInit> = Arc::new(SoftDigestFactory);
    for hs in &HASH_MECH_SET {
        mechs.register(&Descriptor::new_digest_mechanism(
            hs.mech,
            CK_MECHANISM_INFO {
                ulMinKeySize: 0,
                ulMaxKeySize: 0,
                flags: CKF_DIGEST,
            },
            factory.clone(),
        ))?;
    }
    Ok(())
}

/// Registers the software digest mechanisms the configuration enables.
pub fn register_with_config(
    mechs: &mut Mechanisms,
    config: &Config,
) -> Result<()> {
    let factory: Arc<dyn DigestInit> = Arc::new(SoftDigestFactory);
    for hs in &HASH_MECH_SET {
        if !config.hash_enabled(hs.name) {
            continue;
        }
        mechs.register(&Descriptor::new_digest_mechanism(
            hs.mech,
            CK_MECHANISM_INFO {
                ulMinKeySize: 0,
                ulMaxKeySize: 0,
                flags: CKF_DIGEST,
            },
            factory.clone(),
        ))?;
    }
    Ok(())
}
