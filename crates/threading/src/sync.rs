//! Internal lock types.
//!
//! Every piece of shared state in this crate is guarded by `parking_lot`
//! primitives. They do not poison, so a task that panics while holding
//! scheduler or mutex bookkeeping does not wedge the rest of the system.

pub(crate) use parking_lot::{Condvar, Mutex, RwLock};
pub(crate) use std::sync::Arc;
