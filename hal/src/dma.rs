//! DMA facade.

use std::sync::Arc;

use chimera_threading::Lockable;

use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::{dma as codes, Status};

/// DMA controller channel.
pub type Channel = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    MemoryToMemory,
    MemoryToPeripheral,
    PeripheralToMemory,
    PeripheralToPeripheral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Element width of one beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    #[default]
    Byte,
    HalfWord,
    Word,
}

impl Alignment {
    pub const fn bytes(self) -> usize {
        match self {
            Alignment::Byte => 1,
            Alignment::HalfWord => 2,
            Alignment::Word => 4,
        }
    }
}

/// Channel setup applied before any transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferConfig {
    pub direction: Direction,
    pub priority: Priority,
    pub alignment: Alignment,
    /// Step the source address after each beat
    pub src_increment: bool,
    /// Step the destination address after each beat
    pub dst_increment: bool,
    pub validity: bool,
}

/// Completion callback, given the number of bytes moved.
pub type Callback = fn(usize);

/// One DMA channel.
pub trait Driver: Lockable + Send + Sync {
    /// Fails with `INVAL_FUNC_PARAM` if `config` is not valid.
    fn configure(&self, config: &TransferConfig) -> Status;

    /// Copies `src` into `dst`. Lengths must match and be a whole number of
    /// beats.
    fn transfer(&self, src: &[u8], dst: &mut [u8]) -> Status;

    /// `TRANSFER_IN_PROGRESS` while busy, `TRANSFER_COMPLETE` once idle.
    fn status(&self) -> Status {
        codes::TRANSFER_COMPLETE
    }

    fn abort(&self) -> Status {
        Status::NOT_SUPPORTED
    }

    fn on_complete(&self, _callback: Callback) -> Status {
        Status::NOT_SUPPORTED
    }
}

pub type DriverHandle = Arc<dyn Driver>;

driver_registry! {
    /// DMA capability record.
    pub struct DriverRegistry {
        pub get_driver: fn(Channel) -> Option<DriverHandle>,
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("dma", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

pub fn get_driver(channel: Channel) -> Option<DriverHandle> {
    FACADE.entry(|r| r.get_driver).and_then(|get| get(channel))
}

pub fn is_supported() -> bool {
    FACADE.is_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::FACADE_LOCK;

    #[test]
    fn unbacked_dma() {
        let _serial = FACADE_LOCK.lock();
        backend::uninstall();
        assert!(get_driver(0).is_none());
        assert_eq!(initialize(), Status::NOT_SUPPORTED);
        assert_eq!(reset(), Status::NOT_SUPPORTED);
    }

    #[test]
    fn alignment_widths() {
        assert_eq!(Alignment::Word.bytes(), 4);
        assert!(!TransferConfig::default().validity);
    }
}
