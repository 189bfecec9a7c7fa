//! Backend dispatch core shared by every facade.
//!
//! Each facade owns one process-wide [`Facade`] holding its driver registry
//! record: a support flag plus optional function entries. A backend fills
//! the record from a registration hook. Until it does, and whenever an entry
//! is missing, the facade answers [`Status::NOT_SUPPORTED`] (or `None` /
//! `false` for value-returning operations) without calling anything.
//!
//! ```text
//! initialize():  zero record -> hook(&mut record) -> store -> record.initialize()
//! op(...):       copy entry out under read lock -> call it
//! ```

use log::{debug, warn};
use parking_lot::{const_mutex, const_rwlock, Mutex, RwLock};

use crate::status::Status;

/// Registration hook signature: fills `record` and reports the outcome.
pub type RegisterFn<R> = fn(&mut R) -> Status;

/// A facade's driver registry record.
///
/// Implemented by each facade's `DriverRegistry` through `driver_registry!`.
pub trait Registry: Copy + Send + Sync + 'static {
    /// The zeroed record: unsupported, every entry absent.
    const EMPTY: Self;

    fn is_supported(&self) -> bool;

    fn set_supported(&mut self, supported: bool);

    fn initialize_entry(&self) -> Option<fn() -> Status>;

    fn reset_entry(&self) -> Option<fn() -> Status>;
}

/// Weak default registration: marks the record unsupported.
pub fn unbacked<R: Registry>(record: &mut R) -> Status {
    record.set_supported(false);
    Status::NOT_SUPPORTED
}

/// Process-wide dispatch state of one facade.
pub struct Facade<R: Registry> {
    name: &'static str,
    record: RwLock<R>,
    hook: RwLock<Option<RegisterFn<R>>>,
    weak_default: RegisterFn<R>,
    init_lock: Mutex<()>,
}

impl<R: Registry> Facade<R> {
    /// Creates an unregistered facade. `weak_default` runs when no backend
    /// hook is installed.
    pub const fn new(name: &'static str, weak_default: RegisterFn<R>) -> Self {
        Self {
            name,
            record: const_rwlock(R::EMPTY),
            hook: const_rwlock(None),
            weak_default,
            init_lock: const_mutex(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Installs the backend registration hook used by the next `initialize`.
    pub fn install(&self, hook: RegisterFn<R>) {
        debug!("{}: backend hook installed", self.name);
        *self.hook.write() = Some(hook);
    }

    /// Removes the backend hook and zeroes the record.
    pub fn uninstall(&self) {
        let _serial = self.init_lock.lock();
        *self.hook.write() = None;
        *self.record.write() = R::EMPTY;
        debug!("{}: backend hook removed", self.name);
    }

    pub fn has_backend(&self) -> bool {
        self.hook.read().is_some()
    }

    /// Re-registers the backend and brings it up.
    ///
    /// Concurrent callers are serialized, so the record is always the result
    /// of one complete registration.
    pub fn initialize(&self) -> Status {
        let _serial = self.init_lock.lock();

        let register = self.hook.read().unwrap_or(self.weak_default);
        let mut record = R::EMPTY;
        let result = register(&mut record);
        *self.record.write() = record;

        if result != Status::OK {
            if result == Status::NOT_SUPPORTED {
                debug!("{}: no backend registered", self.name);
            } else {
                warn!("{}: backend registration failed: {}", self.name, result);
            }
            return result;
        }

        match record.initialize_entry().filter(|_| record.is_supported()) {
            Some(initialize) => {
                let status = initialize();
                debug!("{}: backend initialized: {}", self.name, status);
                status
            }
            None => {
                debug!("{}: backend registered without support", self.name);
                Status::NOT_SUPPORTED
            }
        }
    }

    /// Runs the backend reset entry.
    pub fn reset(&self) -> Status {
        match self.entry(R::reset_entry) {
            Some(reset) => reset(),
            None => Status::NOT_SUPPORTED,
        }
    }

    /// Returns true if the current record is marked supported.
    pub fn is_supported(&self) -> bool {
        self.record.read().is_supported()
    }

    /// Copies an entry out of the record if the facade is supported.
    ///
    /// The read lock is released before the entry is returned, so entries may
    /// call back into any facade.
    pub fn entry<F: Copy>(&self, select: impl FnOnce(&R) -> Option<F>) -> Option<F> {
        let record = self.record.read();
        if record.is_supported() {
            select(&*record)
        } else {
            None
        }
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> R {
        *self.record.read()
    }
}

/// Declares a facade's `DriverRegistry` record and implements [`Registry`].
///
/// Every record gets `is_supported`, `initialize` and `reset`; the listed
/// fields are the facade-specific entries.
macro_rules! driver_registry {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident: $ty:ty,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub struct $name {
            /// Set by the backend when it provides this facade
            pub is_supported: bool,
            /// Brings the backend up
            pub initialize: Option<fn() -> $crate::status::Status>,
            /// Returns the backend to its post-reset state
            pub reset: Option<fn() -> $crate::status::Status>,
            $(
                $(#[$field_meta])*
                pub $field: Option<$ty>,
            )*
        }

        impl $crate::registry::Registry for $name {
            const EMPTY: Self = Self {
                is_supported: false,
                initialize: None,
                reset: None,
                $($field: None,)*
            };

            fn is_supported(&self) -> bool {
                self.is_supported
            }

            fn set_supported(&mut self, supported: bool) {
                self.is_supported = supported;
            }

            fn initialize_entry(&self) -> Option<fn() -> $crate::status::Status> {
                self.initialize
            }

            fn reset_entry(&self) -> Option<fn() -> $crate::status::Status> {
                self.reset
            }
        }

        impl Default for $name {
            fn default() -> Self {
                <Self as $crate::registry::Registry>::EMPTY
            }
        }
    };
}

pub(crate) use driver_registry;

/// Declares the `backend` module of a facade: the weak default
/// `register_driver` plus `install`/`uninstall` for the process-wide facade.
macro_rules! facade_backend {
    ($facade:ident, $registry:ty) => {
        /// Backend registration for this facade.
        pub mod backend {
            use super::*;

            /// Weak default registration. Leaves the facade unsupported.
            pub fn register_driver(registry: &mut $registry) -> $crate::status::Status {
                $crate::registry::unbacked(registry)
            }

            /// Installs the backend registration hook.
            pub fn install(hook: $crate::registry::RegisterFn<$registry>) {
                $facade.install(hook);
            }

            /// Removes the backend hook and zeroes the registry record.
            pub fn uninstall() {
                $facade.uninstall();
            }

            /// Returns true if a backend hook is installed.
            pub fn is_installed() -> bool {
                $facade.has_backend()
            }
        }
    };
}

pub(crate) use facade_backend;

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::{const_mutex, Mutex};

    /// Serializes unit tests that touch process-wide facades.
    pub static FACADE_LOCK: Mutex<()> = const_mutex(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    driver_registry! {
        pub struct DoublerRegistry {
            pub double: fn(u32) -> u32,
        }
    }

    static DOUBLER: Facade<DoublerRegistry> = Facade::new("doubler", unbacked);
    static INITS: AtomicUsize = AtomicUsize::new(0);

    fn init_ok() -> Status {
        INITS.fetch_add(1, Ordering::SeqCst);
        Status::OK
    }

    fn reset_busy() -> Status {
        Status::BUSY
    }

    fn double(x: u32) -> u32 {
        x * 2
    }

    fn full_backend(registry: &mut DoublerRegistry) -> Status {
        registry.is_supported = true;
        registry.initialize = Some(init_ok);
        registry.reset = Some(reset_busy);
        registry.double = Some(double);
        Status::OK
    }

    fn refusing_backend(registry: &mut DoublerRegistry) -> Status {
        registry.is_supported = true;
        registry.initialize = Some(init_ok);
        Status::FAILED_INIT
    }

    fn unsupported_backend(registry: &mut DoublerRegistry) -> Status {
        registry.is_supported = false;
        registry.initialize = Some(init_ok);
        Status::OK
    }

    fn call_double(x: u32) -> Option<u32> {
        DOUBLER.entry(|r| r.double).map(|double| double(x))
    }

    #[test]
    fn dispatch_lifecycle() {
        let _serial = test_support::FACADE_LOCK.lock();
        DOUBLER.uninstall();

        // Before initialize.
        assert_eq!(DOUBLER.reset(), Status::NOT_SUPPORTED);
        assert_eq!(call_double(2), None);

        // Weak default.
        assert_eq!(DOUBLER.initialize(), Status::NOT_SUPPORTED);
        assert!(!DOUBLER.is_supported());
        assert_eq!(DOUBLER.reset(), Status::NOT_SUPPORTED);

        // Backed.
        DOUBLER.install(full_backend);
        let before = INITS.load(Ordering::SeqCst);
        assert_eq!(DOUBLER.initialize(), Status::OK);
        assert_eq!(INITS.load(Ordering::SeqCst), before + 1);
        assert_eq!(DOUBLER.reset(), Status::BUSY);
        assert_eq!(call_double(21), Some(42));

        // Re-initialize registers again.
        assert_eq!(DOUBLER.initialize(), Status::OK);
        assert_eq!(INITS.load(Ordering::SeqCst), before + 2);

        DOUBLER.uninstall();
        assert_eq!(call_double(1), None);
        assert!(!DOUBLER.has_backend());
    }

    #[test]
    fn registration_failure_is_surfaced() {
        let _serial = test_support::FACADE_LOCK.lock();
        DOUBLER.install(refusing_backend);
        let before = INITS.load(Ordering::SeqCst);
        assert_eq!(DOUBLER.initialize(), Status::FAILED_INIT);
        assert_eq!(INITS.load(Ordering::SeqCst), before);
        DOUBLER.uninstall();
    }

    #[test]
    fn support_flag_gates_every_entry() {
        let _serial = test_support::FACADE_LOCK.lock();
        DOUBLER.install(unsupported_backend);
        assert_eq!(DOUBLER.initialize(), Status::NOT_SUPPORTED);
        assert!(DOUBLER.snapshot().initialize.is_some());
        assert_eq!(DOUBLER.entry(|r| r.initialize).map(|f| f()), None);
        DOUBLER.uninstall();
    }

    #[test]
    fn concurrent_initialize_is_serialized() {
        let _serial = test_support::FACADE_LOCK.lock();
        DOUBLER.install(full_backend);

        let workers: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| DOUBLER.initialize()))
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), Status::OK);
        }
        assert_eq!(call_double(5), Some(10));
        DOUBLER.uninstall();
    }
}
