//! Simulated memory-to-memory DMA.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chimera::dma::{
    Callback, Channel, Direction, Driver, DriverHandle, DriverRegistry, TransferConfig,
};
use chimera::status::dma as codes;
use chimera::{LightFlatMap, Status};
use chimera_threading::{Lockable, RecursiveTimedMutex};
use log::trace;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

static CHANNELS: Lazy<LightFlatMap<Channel, Arc<SimDma>, 4>> = Lazy::new(|| {
    LightFlatMap::new([
        (0, Arc::new(SimDma::new(0))),
        (1, Arc::new(SimDma::new(1))),
        (2, Arc::new(SimDma::new(2))),
        (3, Arc::new(SimDma::new(3))),
    ])
});

/// Simulated DMA channel
#[derive(Debug)]
pub struct SimDma {
    channel: Channel,
    mutex: RecursiveTimedMutex,
    config: Mutex<Option<TransferConfig>>,
    on_complete: Mutex<Option<Callback>>,
    busy: AtomicBool,
}

impl SimDma {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            mutex: RecursiveTimedMutex::new(),
            config: Mutex::new(None),
            on_complete: Mutex::new(None),
            busy: AtomicBool::new(false),
        }
    }
}

impl Lockable for SimDma {
    fn lockable_mutex(&self) -> &RecursiveTimedMutex {
        &self.mutex
    }
}

impl Driver for SimDma {
    fn configure(&self, config: &TransferConfig) -> Status {
        if !config.validity {
            return Status::INVAL_FUNC_PARAM;
        }
        if config.direction != Direction::MemoryToMemory {
            return Status::NOT_SUPPORTED;
        }
        let _guard = self.lock_guard();
        *self.config.lock() = Some(*config);
        Status::OK
    }

    fn transfer(&self, src: &[u8], dst: &mut [u8]) -> Status {
        let _guard = self.lock_guard();
        let Some(config) = *self.config.lock() else {
            return Status::NOT_INITIALIZED;
        };
        if src.len() != dst.len() || src.len() % config.alignment.bytes() != 0 {
            return Status::INVAL_FUNC_PARAM;
        }

        self.busy.store(true, Ordering::SeqCst);
        if config.src_increment && config.dst_increment {
            dst.copy_from_slice(src);
        } else if config.dst_increment {
            // Fixed source: the first beat is replicated.
            let beat = config.alignment.bytes();
            for chunk in dst.chunks_mut(beat) {
                chunk.copy_from_slice(&src[..beat]);
            }
        } else {
            // Fixed destination: only the last beat lands.
            let beat = config.alignment.bytes();
            let tail = src.len().saturating_sub(beat);
            let dst_len = dst.len();
            dst[..beat.min(dst_len)].copy_from_slice(&src[tail..]);
        }
        self.busy.store(false, Ordering::SeqCst);
        trace!("dma{}: copied {} bytes", self.channel, src.len());

        let callback = *self.on_complete.lock();
        if let Some(callback) = callback {
            callback(src.len());
        }
        Status::OK
    }

    fn status(&self) -> Status {
        if self.busy.load(Ordering::SeqCst) {
            codes::TRANSFER_IN_PROGRESS
        } else {
            codes::TRANSFER_COMPLETE
        }
    }

    fn abort(&self) -> Status {
        self.busy.store(false, Ordering::SeqCst);
        Status::OK
    }

    fn on_complete(&self, callback: Callback) -> Status {
        *self.on_complete.lock() = Some(callback);
        Status::OK
    }
}

pub fn channel(channel: Channel) -> Option<Arc<SimDma>> {
    CHANNELS.get(&channel).cloned()
}

fn get_driver(number: Channel) -> Option<DriverHandle> {
    channel(number).map(|c| c as DriverHandle)
}

fn initialize() -> Status {
    Lazy::force(&CHANNELS);
    Status::OK
}

fn reset() -> Status {
    for (_, dma) in CHANNELS.iter() {
        *dma.config.lock() = None;
        *dma.on_complete.lock() = None;
    }
    Status::OK
}

/// Registration hook for the DMA facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.get_driver = Some(get_driver);
    Status::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera::dma::Alignment;

    fn mem_copy(alignment: Alignment) -> TransferConfig {
        TransferConfig {
            alignment,
            src_increment: true,
            dst_increment: true,
            validity: true,
            ..TransferConfig::default()
        }
    }

    #[test]
    fn copies_between_buffers() {
        let dma = SimDma::new(9);
        let mut dst = [0u8; 4];
        assert_eq!(dma.transfer(&[1, 2, 3, 4], &mut dst), Status::NOT_INITIALIZED);

        assert_eq!(dma.configure(&mem_copy(Alignment::Word)), Status::OK);
        assert_eq!(dma.transfer(&[1, 2, 3, 4], &mut dst), Status::OK);
        assert_eq!(dst, [1, 2, 3, 4]);
        assert_eq!(dma.status(), codes::TRANSFER_COMPLETE);

        assert_eq!(dma.transfer(&[1, 2], &mut dst), Status::INVAL_FUNC_PARAM);
    }

    #[test]
    fn fixed_source_fills_destination() {
        let dma = SimDma::new(8);
        let config = TransferConfig {
            src_increment: false,
            ..mem_copy(Alignment::HalfWord)
        };
        assert_eq!(dma.configure(&config), Status::OK);

        let mut dst = [0u8; 6];
        assert_eq!(dma.transfer(&[0xAB, 0xCD, 0, 0, 0, 0], &mut dst), Status::OK);
        assert_eq!(dst, [0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD]);
    }

    #[test]
    fn rejects_peripheral_directions() {
        let dma = SimDma::new(7);
        let config = TransferConfig {
            direction: Direction::PeripheralToMemory,
            ..mem_copy(Alignment::Byte)
        };
        assert_eq!(dma.configure(&config), Status::NOT_SUPPORTED);
        assert_eq!(dma.configure(&TransferConfig::default()), Status::INVAL_FUNC_PARAM);
    }
}
