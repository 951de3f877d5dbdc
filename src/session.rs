// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Per-session operation table. A session holds at most one in-flight
//! operation per family; installing a new one implicitly tears down any
//! predecessor of the same kind. Cross-session locking belongs to the
//! embedding framework, which must hand the engine exclusive access to
//! a session for the duration of a call.

use crate::error::{Error, Result};
use crate::operation::{OpKind, Operation};
use crate::pkcs11::*;

/// The operation state of one session.
#[derive(Debug, Default)]
pub struct Session {
    operations: [Option<Operation>; OpKind::COUNT],
}

impl Session {
    /// Creates a session with no operations in flight.
    pub fn new() -> Session {
        Session {
            operations: Default::default(),
        }
    }

    /// Installs an operation handle, replacing (and dropping) any
    /// previous handle of the same kind. There is no queuing.
    pub fn start_operation(&mut self, op: Operation) {
        let kind = op.kind();
        self.operations[kind.idx()] = Some(op);
    }

    /// The installed handle for a family.
    pub fn get_operation_mut(
        &mut self,
        kind: OpKind,
    ) -> Result<&mut Operation> {
        match self.operations[kind.idx()].as_mut() {
            Some(op) => Ok(op),
            None => Err(Error::ck_rv(CKR_OPERATION_NOT_INITIALIZED)),
        }
    }

    /// Tears down the installed handle for a family. Idempotent.
    pub fn stop_operation(&mut self, kind: OpKind) {
        self.operations[kind.idx()] = None;
    }

    /// Whether a family has an operation in flight.
    pub fn has_operation(&self, kind: OpKind) -> bool {
        self.operations[kind.idx()].is_some()
    }
}
