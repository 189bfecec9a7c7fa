//! System queries that are safe to make before any peripheral is up.
//!
//! Threading code sometimes needs system information (the core count, for
//! instance) during bring-up. Asking a peripheral facade for it would make
//! this crate depend on the layer above. Instead a board crate may install a
//! plain function here; without one the host values are reported.

use crate::sync::RwLock;

/// Replacement for the host core-count query.
pub type ConcurrencyQuery = fn() -> usize;

static CONCURRENCY_QUERY: RwLock<Option<ConcurrencyQuery>> = parking_lot::const_rwlock(None);

/// Installs a board-specific core-count query.
pub fn set_concurrency_query(query: ConcurrencyQuery) {
    *CONCURRENCY_QUERY.write() = Some(query);
}

/// Restores the host core-count query.
pub fn clear_concurrency_query() {
    *CONCURRENCY_QUERY.write() = None;
}

/// Number of hardware threads available. Never zero.
pub fn hardware_concurrency() -> usize {
    let query = *CONCURRENCY_QUERY.read();
    match query {
        Some(query) => query().max(1),
        None => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_query_wins_until_cleared() {
        fn single_core() -> usize {
            0
        }

        assert!(hardware_concurrency() >= 1);

        set_concurrency_query(single_core);
        // A zero answer is clamped.
        assert_eq!(hardware_concurrency(), 1);

        clear_concurrency_query();
        assert!(hardware_concurrency() >= 1);
    }
}
