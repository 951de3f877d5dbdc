// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Mechanism descriptors and the per-token registry that resolves an
//! algorithm identifier to one. A descriptor records what a mechanism
//! can do (capability flags, key-size range, accepted key types) and
//! carries the pieces its operations need: a digest factory for
//! software digest mechanisms, composition info for hash-then-sign
//! mechanisms synthesized on top of a raw signature primitive.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::pkcs11::*;

/// Maximum number of key types a single descriptor can accept.
pub const MAX_KEY_TYPES: usize = 4;

/// Upper bound on mechanism parameter length copied into an operation.
pub const MAX_MECH_PARAM_LEN: usize = 256;

/// An owned copy of a mechanism request: identifier plus parameter
/// bytes. The caller's parameter buffer can go away after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mechanism {
    mech: CK_MECHANISM_TYPE,
    param: Vec<u8>,
}

impl Mechanism {
    /// Builds a mechanism request, copying the parameter. Oversized
    /// parameters are rejected before anything else happens.
    pub fn new(mech: CK_MECHANISM_TYPE, param: &[u8]) -> Result<Mechanism> {
        if param.len() > MAX_MECH_PARAM_LEN {
            return Err(Error::ck_rv(CKR_ARGUMENTS_BAD));
        }
        Ok(Mechanism {
            mech: mech,
            param: param.to_vec(),
        })
    }

    /// A parameterless mechanism request.
    pub fn without_param(mech: CK_MECHANISM_TYPE) -> Mechanism {
        Mechanism {
            mech: mech,
            param: Vec::new(),
        }
    }

    /// The mechanism identifier.
    pub fn mech(&self) -> CK_MECHANISM_TYPE {
        self.mech
    }

    /// The copied parameter bytes.
    pub fn param(&self) -> &[u8] {
        self.param.as_slice()
    }
}

/// Bounded, ordered, grow-only set of key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTypeSet {
    types: [CK_KEY_TYPE; MAX_KEY_TYPES],
    count: usize,
}

impl KeyTypeSet {
    /// An empty set (used by digest mechanisms, which are keyless).
    pub fn empty() -> KeyTypeSet {
        KeyTypeSet {
            types: [CK_UNAVAILABLE_INFORMATION; MAX_KEY_TYPES],
            count: 0,
        }
    }

    /// A set holding a single key type.
    pub fn with(key_type: CK_KEY_TYPE) -> KeyTypeSet {
        let mut set = KeyTypeSet::empty();
        set.types[0] = key_type;
        set.count = 1;
        set
    }

    /// Membership test.
    pub fn contains(&self, key_type: CK_KEY_TYPE) -> bool {
        self.types[..self.count].contains(&key_type)
    }

    /// True when no further key type can be added.
    pub fn is_full(&self) -> bool {
        self.count == MAX_KEY_TYPES
    }

    /// Adds a key type; fails with the registry capacity error when all
    /// slots are taken. Adding a member again is a no-op.
    pub fn push(&mut self, key_type: CK_KEY_TYPE) -> Result<()> {
        if self.contains(key_type) {
            return Ok(());
        }
        if self.is_full() {
            return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
        }
        self.types[self.count] = key_type;
        self.count += 1;
        Ok(())
    }

    /// The key types currently in the set, in insertion order.
    pub fn as_slice(&self) -> &[CK_KEY_TYPE] {
        &self.types[..self.count]
    }
}

/// Composition record carried by a synthesized hash-then-sign/verify
/// mechanism: which composite this is, which digest feeds it, which raw
/// signature mechanism finishes it, and the registered digest
/// descriptor to instantiate nested digest operations from.
#[derive(Debug, Clone)]
pub struct HashSignatureInfo {
    /// The composite mechanism identifier.
    pub mech: CK_MECHANISM_TYPE,
    /// The digest half.
    pub hash_mech: CK_MECHANISM_TYPE,
    /// The raw signature half.
    pub sign_mech: CK_MECHANISM_TYPE,
    /// Registered descriptor of the digest half.
    pub hash_ref: Arc<Descriptor>,
}

/// Descriptor-owned private data. Cloning a descriptor clones this with
/// it; dropping the descriptor releases it.
#[derive(Debug, Clone, Default)]
pub enum MechData {
    /// No private payload.
    #[default]
    None,
    /// Hash-then-sign composition payload.
    HashSignature(HashSignatureInfo),
}

/// One in-flight digest computation.
pub trait Digest: Debug + Send + Sync {
    /// Feeds message bytes.
    fn digest_update(&mut self, data: &[u8]) -> Result<()>;
    /// Writes the digest into `digest` and consumes the state. The
    /// buffer must be at least [`Self::digest_len`] bytes.
    fn digest_final(&mut self, digest: &mut [u8]) -> Result<usize>;
    /// Output size of this digest.
    fn digest_len(&self) -> Result<usize>;
}

/// Factory installed on digest descriptors.
pub trait DigestInit: Debug + Send + Sync {
    /// Instantiates a digest operation for `mech`.
    fn digest_new(&self, mech: &Mechanism) -> Result<Box<dyn Digest>>;
}

/// Software raw-verification primitive. Signature verification never
/// goes through the key driver: it recomputes the digest (when a nested
/// digest operation is present) and checks the signature against the
/// exported public key material.
pub trait VerifyData: Debug + Send + Sync {
    /// Verifies `signature` over the accumulated `data` (or over the
    /// digest recovered by finalizing `md`) using the exported public
    /// key bytes and, where the key family needs them, extra domain
    /// parameters.
    fn verify_data(
        &self,
        pubkey: &[u8],
        key_params: &[u8],
        mech: &Mechanism,
        md: Option<&mut Operation>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()>;
}

/// In-memory record of one mechanism a token supports.
#[derive(Debug, Clone)]
pub struct Descriptor {
    mech: CK_MECHANISM_TYPE,
    info: CK_MECHANISM_INFO,
    key_types: KeyTypeSet,
    mech_data: MechData,
    digest: Option<Arc<dyn DigestInit>>,
}

impl Descriptor {
    /// A card-backed mechanism: operations run through the key driver.
    pub fn new_token_mechanism(
        mech: CK_MECHANISM_TYPE,
        info: CK_MECHANISM_INFO,
        key_type: CK_KEY_TYPE,
    ) -> Descriptor {
        Descriptor {
            mech: mech,
            info: info,
            key_types: KeyTypeSet::with(key_type),
            mech_data: MechData::None,
            digest: None,
        }
    }

    /// A software digest mechanism.
    pub fn new_digest_mechanism(
        mech: CK_MECHANISM_TYPE,
        info: CK_MECHANISM_INFO,
        digest: Arc<dyn DigestInit>,
    ) -> Descriptor {
        Descriptor {
            mech: mech,
            info: info,
            key_types: KeyTypeSet::empty(),
            mech_data: MechData::None,
            digest: Some(digest),
        }
    }

    /// A synthesized hash-then-sign mechanism carrying composition info
    /// and the raw signer's key types.
    pub fn new_composite_mechanism(
        mech: CK_MECHANISM_TYPE,
        info: CK_MECHANISM_INFO,
        key_types: KeyTypeSet,
        data: HashSignatureInfo,
    ) -> Descriptor {
        Descriptor {
            mech: mech,
            info: info,
            key_types: key_types,
            mech_data: MechData::HashSignature(data),
            digest: None,
        }
    }

    /// The mechanism identifier.
    pub fn mech(&self) -> CK_MECHANISM_TYPE {
        self.mech
    }

    /// Capability flags and key-size range.
    pub fn info(&self) -> &CK_MECHANISM_INFO {
        &self.info
    }

    /// The accepted key types.
    pub fn key_types(&self) -> &KeyTypeSet {
        &self.key_types
    }

    /// The descriptor's private payload.
    pub fn mech_data(&self) -> &MechData {
        &self.mech_data
    }

    /// The digest factory, present on digest mechanisms only.
    pub fn digest_factory(&self) -> Option<&Arc<dyn DigestInit>> {
        self.digest.as_ref()
    }

    /// Checks a declared key type against the accepted set. The
    /// mismatch error is distinct from "mechanism not found" so callers
    /// can tell "wrong key" from "not supported at all".
    pub fn validate_key_type(&self, key_type: CK_KEY_TYPE) -> Result<()> {
        if self.key_types.contains(key_type) {
            Ok(())
        } else {
            Err(Error::ck_rv(CKR_KEY_TYPE_INCONSISTENT))
        }
    }

    /// Widens the key-size range and ORs in the capability flags of a
    /// re-registration of the same mechanism.
    fn update_info(&mut self, new_info: &CK_MECHANISM_INFO) {
        if new_info.ulMaxKeySize > self.info.ulMaxKeySize {
            self.info.ulMaxKeySize = new_info.ulMaxKeySize;
        }
        if new_info.ulMinKeySize < self.info.ulMinKeySize {
            self.info.ulMinKeySize = new_info.ulMinKeySize;
        }
        self.info.flags |= new_info.flags;
    }
}

/// Per-token mechanism registry. Insertion order is lookup order, so
/// the first registered match wins ties.
#[derive(Debug, Default)]
pub struct Mechanisms {
    list: Vec<Arc<Descriptor>>,
}

impl Mechanisms {
    /// Creates an empty registry.
    pub fn new() -> Mechanisms {
        Mechanisms { list: Vec::new() }
    }

    /// Number of registered mechanisms.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// All registered mechanism identifiers, in registration order.
    pub fn list(&self) -> Vec<CK_MECHANISM_TYPE> {
        self.list.iter().map(|m| m.mech()).collect()
    }

    /// Registers a mechanism. A first registration stores a deep clone
    /// of `mt` and returns it; re-registering the same identifier
    /// merges the key-size range and flags, adding the key type to a
    /// free slot when it is new. The returned descriptor is the stored
    /// one and outlives the caller's `mt`, so it can be used for
    /// composition chaining.
    ///
    /// Runs out of key-type slots with `CKR_BUFFER_TOO_SMALL`, leaving
    /// the registered descriptor untouched.
    pub fn register(&mut self, mt: &Descriptor) -> Result<Arc<Descriptor>> {
        let idx = match self.list.iter().position(|m| m.mech() == mt.mech()) {
            Some(i) => i,
            None => {
                let stored = Arc::new(mt.clone());
                self.list.push(stored.clone());
                return Ok(stored);
            }
        };

        let new_types = mt.key_types().as_slice();
        let existing = &self.list[idx];
        match new_types.first() {
            Some(kt) if !existing.key_types.contains(*kt) => {
                if existing.key_types.is_full() {
                    log::error!(
                        "too many key types in mechanism 0x{:x}, more than {}",
                        mt.mech(),
                        MAX_KEY_TYPES
                    );
                    return Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL));
                }
                let merged = Arc::make_mut(&mut self.list[idx]);
                merged.update_info(mt.info());
                merged.key_types.push(*kt)?;
            }
            _ => {
                /* key type already present (or keyless): refresh info */
                let merged = Arc::make_mut(&mut self.list[idx]);
                merged.update_info(mt.info());
            }
        }
        Ok(self.list[idx].clone())
    }

    /// Resolves `mech` under the required capability flags: the first
    /// descriptor, in registration order, whose flags are a superset.
    pub fn find(
        &self,
        mech: CK_MECHANISM_TYPE,
        flags: CK_FLAGS,
    ) -> Option<Arc<Descriptor>> {
        self.list
            .iter()
            .find(|m| m.mech() == mech && (m.info().flags & flags) == flags)
            .cloned()
    }

    /// Mechanism-info query, flag agnostic.
    pub fn info(&self, mech: CK_MECHANISM_TYPE) -> Option<CK_MECHANISM_INFO> {
        self.find(mech, 0).map(|m| *m.info())
    }
}
