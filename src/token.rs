// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Per-token facilities the engine needs: the mechanism registry, the
//! handle manager and object table for token-resident keys created at
//! runtime (unwrap), and the software verification provider slot.
//! Registration happens at token initialization time; list and info
//! queries are read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mechanism::{Descriptor, Mechanisms, VerifyData};
use crate::object::Object;
use crate::pkcs11::*;

use bimap;
use uuid::Uuid;

/// Maps persistent object UIDs to runtime handles and hands out new
/// unique handles.
#[derive(Debug)]
pub struct Handles {
    map: bimap::hash::BiHashMap<CK_OBJECT_HANDLE, String>,
    next: CK_OBJECT_HANDLE,
}

impl Handles {
    /// Creates an empty handle manager.
    pub fn new() -> Handles {
        Handles {
            map: bimap::hash::BiHashMap::new(),
            next: 1,
        }
    }

    /// Inserts a new handle-UID mapping; fails if the handle is taken.
    pub fn insert(
        &mut self,
        handle: CK_OBJECT_HANDLE,
        uid: String,
    ) -> Result<()> {
        match self.map.insert_no_overwrite(handle, uid) {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::ck_rv(CKR_GENERAL_ERROR)),
        }
    }

    /// The UID mapped to a handle.
    pub fn get(&self, handle: CK_OBJECT_HANDLE) -> Option<&String> {
        self.map.get_by_left(&handle)
    }

    /// The handle mapped to a UID.
    pub fn get_by_uid(&self, uid: &String) -> Option<&CK_OBJECT_HANDLE> {
        self.map.get_by_right(uid)
    }

    /// Drops a mapping by handle.
    pub fn remove(&mut self, handle: CK_OBJECT_HANDLE) {
        let _ = self.map.remove_by_left(&handle);
    }

    /// Next available handle. Collisions are caught at insertion.
    pub fn next(&mut self) -> CK_OBJECT_HANDLE {
        let next = self.next;
        self.next += 1;
        next
    }
}

/// A token: mechanism registry, runtime object table, and the seam for
/// the software raw-verification primitive.
#[derive(Debug)]
pub struct Token {
    label: String,
    mechanisms: Mechanisms,
    handles: Handles,
    objects: HashMap<CK_OBJECT_HANDLE, Arc<Object>>,
    verifier: Option<Arc<dyn VerifyData>>,
}

impl Token {
    /// Creates a token with an empty registry and object table.
    pub fn new(label: &str) -> Token {
        Token {
            label: label.to_string(),
            mechanisms: Mechanisms::new(),
            handles: Handles::new(),
            objects: HashMap::new(),
            verifier: None,
        }
    }

    /// The token label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The mechanism registry.
    pub fn mechanisms(&self) -> &Mechanisms {
        &self.mechanisms
    }

    /// Mutable registry access, for registration at init time.
    pub fn mechanisms_mut(&mut self) -> &mut Mechanisms {
        &mut self.mechanisms
    }

    /// Registers a mechanism, returning the stored descriptor for
    /// composition chaining.
    pub fn register_mechanism(
        &mut self,
        mt: &Descriptor,
    ) -> Result<Arc<Descriptor>> {
        self.mechanisms.register(mt)
    }

    /// Installs the software verification primitive used by the verify
    /// family.
    pub fn set_verify_provider(&mut self, verifier: Arc<dyn VerifyData>) {
        self.verifier = Some(verifier);
    }

    /// The installed verification primitive, if any.
    pub fn verify_provider(&self) -> Option<Arc<dyn VerifyData>> {
        self.verifier.clone()
    }

    /// Enumerates registered mechanism identifiers. With no output
    /// buffer only the count is reported. With one, identifiers are
    /// written up to its capacity; the count always reports the true
    /// total, and a truncated write fails with `CKR_BUFFER_TOO_SMALL`
    /// after writing what fits.
    pub fn get_mechanism_list(
        &self,
        list: Option<&mut [CK_MECHANISM_TYPE]>,
        count: &mut CK_ULONG,
    ) -> Result<()> {
        let mechs = self.mechanisms.list();
        *count = mechs.len() as CK_ULONG;
        match list {
            None => Ok(()),
            Some(buf) => {
                let n = std::cmp::min(buf.len(), mechs.len());
                buf[..n].copy_from_slice(&mechs[..n]);
                if buf.len() < mechs.len() {
                    Err(Error::ck_rv(CKR_BUFFER_TOO_SMALL))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Capability and key-size information for one mechanism.
    pub fn get_mechanism_info(
        &self,
        mech: CK_MECHANISM_TYPE,
    ) -> Result<CK_MECHANISM_INFO> {
        match self.mechanisms.info(mech) {
            Some(info) => Ok(info),
            None => Err(Error::ck_rv(CKR_MECHANISM_INVALID)),
        }
    }

    /// Inserts an object into the token's runtime table, assigning a
    /// fresh handle and UID.
    pub fn add_object(&mut self, mut obj: Object) -> Result<CK_OBJECT_HANDLE> {
        let handle = self.handles.next();
        self.handles.insert(handle, Uuid::new_v4().to_string())?;
        obj.set_handle(handle);
        self.objects.insert(handle, Arc::new(obj));
        Ok(handle)
    }

    /// Looks up an object by handle.
    pub fn object(&self, handle: CK_OBJECT_HANDLE) -> Result<&Arc<Object>> {
        match self.objects.get(&handle) {
            Some(obj) => Ok(obj),
            None => Err(Error::ck_rv(CKR_KEY_HANDLE_INVALID)),
        }
    }
}
