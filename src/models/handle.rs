//! Process-unique element handles
//!
//! Handles identify an element across save/load. Fresh handles come from a
//! process-wide counter; handles read back from a document are reserved so the
//! counter never hands them out again.

use crate::error::HandleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identifier of an element
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ElementHandle(u64);

impl ElementHandle {
    /// Allocate a handle no other element in this process has
    ///
    /// Once the counter is exhausted it restarts from 1; trees skip handles
    /// they already hold when creating elements.
    pub fn allocate() -> Self {
        match NEXT_HANDLE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| next.checked_add(1)) {
            Ok(raw) => ElementHandle(raw),
            Err(_) => {
                log::error!("element handle space exhausted, restarting from 1");
                NEXT_HANDLE.store(2, Ordering::Relaxed);
                ElementHandle(1)
            }
        }
    }

    /// Mark a handle as used so `allocate` skips past it
    ///
    /// `u64::MAX` is rejected: the counter could not move beyond it.
    pub fn reserve(raw: u64) -> Result<Self, HandleError> {
        let next = raw.checked_add(1).ok_or(HandleError::OutOfRange(raw))?;
        NEXT_HANDLE.fetch_max(next, Ordering::Relaxed);
        Ok(ElementHandle(raw))
    }

    /// Raw value written to documents
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElementHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementHandle::reserve(s.trim().parse::<u64>()?)
    }
}
