//! Simulated SPI channels.
//!
//! MISO is looped back to MOSI: every byte written is what the next read
//! returns.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chimera::gpio::State;
use chimera::peripheral::PeripheralMode;
use chimera::spi::{
    self, Callback, Channel, ClockFreq, CsMode, Driver, DriverConfig, DriverHandle,
    DriverRegistry, SubPeripheral,
};
use chimera::status::spi as codes;
use chimera::{LightFlatMap, Status};
use chimera_threading::{Lockable, RecursiveTimedMutex};
use log::{debug, trace};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

const MHZ: ClockFreq = 1_000_000;

/// Clock rates every simulated channel can generate.
pub const SUPPORTED_CLOCKS: [ClockFreq; 4] = [MHZ, 2 * MHZ, 4 * MHZ, 8 * MHZ];

/// Largest single transfer.
pub const MAX_TRANSFER: usize = 512;

static CHANNELS: Lazy<LightFlatMap<Channel, Arc<SimSpi>, 3>> = Lazy::new(|| {
    LightFlatMap::new([
        (0, Arc::new(SimSpi::new(0))),
        (1, Arc::new(SimSpi::new(1))),
        (2, Arc::new(SimSpi::new(2))),
    ])
});

#[derive(Debug, Default)]
struct SpiState {
    config: Option<DriverConfig>,
    clock: ClockFreq,
    chip_select: State,
    cs_mode: CsMode,
    tx_mode: PeripheralMode,
    rx_mode: PeripheralMode,
    loopback: VecDeque<u8>,
    on_write: Option<Callback>,
    on_read: Option<Callback>,
    on_read_write: Option<Callback>,
    on_error: Option<Callback>,
}

/// Simulated SPI channel
#[derive(Debug)]
pub struct SimSpi {
    channel: Channel,
    mutex: RecursiveTimedMutex,
    state: Mutex<SpiState>,
}

impl SimSpi {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            mutex: RecursiveTimedMutex::new(),
            state: Mutex::new(SpiState::default()),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Current chip select level.
    pub fn chip_select(&self) -> State {
        self.state.lock().chip_select
    }

    /// Frames a transfer with the chip select when it is automatic.
    fn transfer<T>(&self, len: usize, op: impl FnOnce(&mut SpiState) -> T) -> Result<T, Status> {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if state.config.is_none() {
            return Err(Status::NOT_INITIALIZED);
        }
        if len > MAX_TRANSFER {
            let on_error = state.on_error;
            drop(state);
            if let Some(on_error) = on_error {
                on_error(len);
            }
            return Err(codes::PACKET_TOO_LARGE_FOR_BUFFER);
        }

        let auto_cs = state.cs_mode != CsMode::Manual;
        if auto_cs {
            state.chip_select = State::Low;
        }
        let out = op(&mut state);
        if auto_cs {
            state.chip_select = State::High;
        }
        trace!("spi{}: moved {} bytes", self.channel, len);
        Ok(out)
    }

    fn complete(callback: Option<Callback>, mode: PeripheralMode, len: usize) {
        if mode == PeripheralMode::Blocking {
            return;
        }
        if let Some(callback) = callback {
            callback(len);
        }
    }
}

impl Lockable for SimSpi {
    fn lockable_mutex(&self) -> &RecursiveTimedMutex {
        &self.mutex
    }
}

impl Driver for SimSpi {
    fn init(&self, config: &DriverConfig) -> Status {
        if !config.validity || !config.hw_init.validity {
            return Status::INVAL_FUNC_PARAM;
        }
        if config.hw_init.hw_channel != self.channel {
            return codes::INVALID_HARDWARE_PARAM;
        }

        let _guard = self.lock_guard();
        let Some((clock, fit)) = spi::select_clock(&SUPPORTED_CLOCKS, config.hw_init.clock_freq, 0)
        else {
            return codes::INVALID_HARDWARE_PARAM;
        };

        let mut state = self.state.lock();
        state.config = Some(*config);
        state.clock = clock;
        state.chip_select = State::High;
        state.cs_mode = config.hw_init.cs_mode;
        state.tx_mode = config.hw_init.transfer_mode;
        state.rx_mode = config.hw_init.transfer_mode;
        state.loopback.clear();
        debug!("spi{}: init at {} Hz ({})", self.channel, clock, fit);
        Status::OK
    }

    fn deinit(&self) -> Status {
        let _guard = self.lock_guard();
        *self.state.lock() = SpiState::default();
        Status::OK
    }

    fn set_chip_select(&self, level: State) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if state.config.is_none() {
            return Status::NOT_INITIALIZED;
        }
        if state.config.is_some_and(|c| c.external_cs) {
            return codes::FAILED_CHIP_SELECT_WRITE;
        }
        state.chip_select = level;
        Status::OK
    }

    fn set_chip_select_control_mode(&self, mode: CsMode) -> Status {
        let _guard = self.lock_guard();
        self.state.lock().cs_mode = mode;
        Status::OK
    }

    fn write_bytes(&self, tx: &[u8], _timeout: Duration) -> Status {
        let result = self.transfer(tx.len(), |state| {
            state.loopback.extend(tx.iter().copied());
            while state.loopback.len() > MAX_TRANSFER {
                state.loopback.pop_front();
            }
            (state.on_write, state.tx_mode)
        });
        match result {
            Ok((callback, mode)) => {
                Self::complete(callback, mode, tx.len());
                Status::OK
            }
            Err(status) => status,
        }
    }

    fn read_bytes(&self, rx: &mut [u8], _timeout: Duration) -> Status {
        let len = rx.len();
        let result = self.transfer(len, |state| {
            for byte in rx.iter_mut() {
                *byte = state.loopback.pop_front().unwrap_or(0);
            }
            (state.on_read, state.rx_mode)
        });
        match result {
            Ok((callback, mode)) => {
                Self::complete(callback, mode, len);
                Status::OK
            }
            Err(status) => status,
        }
    }

    fn read_write_bytes(&self, tx: &[u8], rx: &mut [u8], _timeout: Duration) -> Status {
        if tx.len() != rx.len() {
            return Status::INVAL_FUNC_PARAM;
        }
        let result = self.transfer(tx.len(), |state| {
            rx.copy_from_slice(tx);
            (state.on_read_write, state.tx_mode)
        });
        match result {
            Ok((callback, mode)) => {
                Self::complete(callback, mode, tx.len());
                Status::OK
            }
            Err(status) => status,
        }
    }

    fn set_peripheral_mode(&self, periph: SubPeripheral, mode: PeripheralMode) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        match periph {
            SubPeripheral::Tx => state.tx_mode = mode,
            SubPeripheral::Rx => state.rx_mode = mode,
            SubPeripheral::TxRx => {
                state.tx_mode = mode;
                state.rx_mode = mode;
            }
        }
        Status::OK
    }

    fn set_clock_frequency(&self, freq: ClockFreq, tolerance: u32) -> Status {
        let _guard = self.lock_guard();
        match spi::select_clock(&SUPPORTED_CLOCKS, freq, tolerance) {
            Some((clock, fit)) => {
                self.state.lock().clock = clock;
                debug!("spi{}: clock {} Hz for {} Hz requested", self.channel, clock, freq);
                fit
            }
            None => codes::INVALID_HARDWARE_PARAM,
        }
    }

    fn get_clock_frequency(&self) -> Result<ClockFreq, Status> {
        let state = self.state.lock();
        match state.config {
            Some(_) => Ok(state.clock),
            None => Err(Status::NOT_INITIALIZED),
        }
    }

    fn on_write_complete(&self, callback: Callback) -> Status {
        self.state.lock().on_write = Some(callback);
        Status::OK
    }

    fn on_read_complete(&self, callback: Callback) -> Status {
        self.state.lock().on_read = Some(callback);
        Status::OK
    }

    fn on_read_write_complete(&self, callback: Callback) -> Status {
        self.state.lock().on_read_write = Some(callback);
        Status::OK
    }

    fn on_error(&self, callback: Callback) -> Status {
        self.state.lock().on_error = Some(callback);
        Status::OK
    }
}

/// Simulated channel, or `None` if it does not exist.
pub fn channel(channel: Channel) -> Option<Arc<SimSpi>> {
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
    for (_, driver) in CHANNELS.iter() {
        driver.deinit();
    }
    Status::OK
}

/// Registration hook for the SPI facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.get_driver = Some(get_driver);
    Status::OK
}
