//! The dynamic-statement manager (§4.9): tracks server-side prepared
//! statements by a driver-assigned decimal id, guarding the id space
//! and per-statement state against concurrent lookup and registration
//! as required by §5.
//!
//! Id/state conventions mirror `package/dynamic.rs`'s wire-level
//! `Dynamic` operations; the map itself tracks the reader-writer-lock
//! contract of §5 directly since no prepared-statement registry exists
//! at the package layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::types::FieldFmt;

/// Where a dynamic statement sits in its lifecycle (§4.9's component
/// table): `Prepare` moves it to `Prepared`, `Exec` requires `Prepared`
/// or `Executing`, `Dealloc` moves it to `Deallocated` and forgets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicState {
    Prepared,
    Executing,
    Deallocated,
}

/// A server-side prepared statement this driver has registered.
#[derive(Debug, Clone)]
pub struct DynamicStatement {
    pub id: u32,
    pub sql: String,
    pub input_fmt: Option<Vec<FieldFmt>>,
    pub output_fmt: Option<Vec<FieldFmt>>,
    pub state: DynamicState,
}

/// Registry of this connection's dynamic statements, keyed by the
/// driver-assigned id. Cheaply cloneable; clones share the same map.
#[derive(Clone, Default)]
pub struct DynamicStatements {
    next_id: Arc<AtomicU32>,
    statements: Arc<RwLock<HashMap<u32, DynamicStatement>>>,
}

impl DynamicStatements {
    pub fn new() -> Self {
        DynamicStatements {
            next_id: Arc::new(AtomicU32::new(1)),
            statements: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Allocates a fresh id without registering it in the map -- for an
    /// `ExecImmediate` round, which needs an id for the wire format but
    /// has no lifecycle to track since it prepares, executes, and
    /// forgets the statement in one round trip.
    pub fn alloc_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocates a fresh id and registers a `Prepared` statement under
    /// it. The caller has already sent the `Dynamic(Prepare)` package
    /// and is recording the outcome once the server's `Ack`/`Done` pair
    /// confirms it.
    pub async fn register(&self, sql: impl Into<String>) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let statement = DynamicStatement {
            id,
            sql: sql.into(),
            input_fmt: None,
            output_fmt: None,
            state: DynamicState::Prepared,
        };
        self.statements.write().await.insert(id, statement);
        id
    }

    pub async fn set_formats(
        &self,
        id: u32,
        input_fmt: Option<Vec<FieldFmt>>,
        output_fmt: Option<Vec<FieldFmt>>,
    ) -> Result<()> {
        let mut guard = self.statements.write().await;
        let statement = guard
            .get_mut(&id)
            .ok_or_else(|| unknown_id(id))?;
        if input_fmt.is_some() {
            statement.input_fmt = input_fmt;
        }
        if output_fmt.is_some() {
            statement.output_fmt = output_fmt;
        }
        Ok(())
    }

    /// Looks up a statement by id, erroring if it's unknown or already
    /// deallocated -- a caller trying to execute a statement that was
    /// already dropped has a logic bug, not a transient condition.
    pub async fn get(&self, id: u32) -> Result<DynamicStatement> {
        let guard = self.statements.read().await;
        match guard.get(&id) {
            Some(statement) if statement.state != DynamicState::Deallocated => {
                Ok(statement.clone())
            }
            Some(_) => Err(Error::ProtocolViolation(format!(
                "dynamic statement {id} has already been deallocated"
            ))),
            None => Err(unknown_id(id)),
        }
    }

    pub async fn mark_executing(&self, id: u32) -> Result<()> {
        let mut guard = self.statements.write().await;
        let statement = guard.get_mut(&id).ok_or_else(|| unknown_id(id))?;
        statement.state = DynamicState::Executing;
        Ok(())
    }

    /// Forgets a statement once its `Dynamic(Dealloc)` round has been
    /// acknowledged by the server.
    pub async fn deallocate(&self, id: u32) -> Result<()> {
        let mut guard = self.statements.write().await;
        if guard.remove(&id).is_none() {
            return Err(unknown_id(id));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.statements.read().await.len()
    }
}

fn unknown_id(id: u32) -> Error {
    Error::ProtocolViolation(format!("no dynamic statement registered with id {id}"))
}
