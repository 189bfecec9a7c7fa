//! SPI facade.

use std::sync::Arc;
use std::time::Duration;

use chimera_threading::Lockable;

use crate::gpio::{self, PinInit};
use crate::peripheral::PeripheralMode;
use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::{spi as codes, Status};

/// Hardware channel.
pub type Channel = u8;

/// Clock frequency in Hz.
pub type ClockFreq = u32;

/// Transfer controller mode.
pub type TransferMode = PeripheralMode;

/// Bit transmission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

/// Clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClockMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

/// Bus arbitration role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlMode {
    /// This device starts and stops transfers
    #[default]
    Master,
    /// This device answers another master
    Slave,
}

/// Minimum transfer width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataSize {
    #[default]
    Bits8,
    Bits9,
    Bits10,
    Bits11,
    Bits12,
    Bits13,
    Bits14,
    Bits15,
    Bits16,
}

impl DataSize {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits8 => 8,
            Self::Bits9 => 9,
            Self::Bits10 => 10,
            Self::Bits11 => 11,
            Self::Bits12 => 12,
            Self::Bits13 => 13,
            Self::Bits14 => 14,
            Self::Bits15 => 15,
            Self::Bits16 => 16,
        }
    }
}

/// Chip select handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CsMode {
    /// Software drives the line
    #[default]
    Manual,
    /// Toggled between transfers, released on completion
    AutoBetweenTransfer,
    /// Released only after all transfers complete
    AutoAfterTransfer,
}

/// Direction of a sub-peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubPeripheral {
    Tx,
    Rx,
    TxRx,
}

/// Asynchronous transfer events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    RxComplete,
    QueuedRxComplete,
    TxComplete,
    QueuedTxComplete,
    TxRxComplete,
    QueuedTxRxComplete,
    SlaveRxByte,
    SlaveRxHalf,
    SlaveRxFull,
}

/// Hardware configuration of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareInit {
    pub bit_order: BitOrder,
    pub control_mode: ControlMode,
    /// Desired approximate clock frequency
    pub clock_freq: ClockFreq,
    pub clock_mode: ClockMode,
    pub cs_mode: CsMode,
    pub data_size: DataSize,
    pub hw_channel: Channel,
    pub transfer_mode: TransferMode,
    pub validity: bool,
}

impl Default for HardwareInit {
    fn default() -> Self {
        Self {
            bit_order: BitOrder::MsbFirst,
            control_mode: ControlMode::Master,
            clock_freq: 1_000_000,
            clock_mode: ClockMode::Mode0,
            cs_mode: CsMode::Manual,
            data_size: DataSize::Bits8,
            hw_channel: 0,
            transfer_mode: TransferMode::Blocking,
            validity: false,
        }
    }
}

/// Full driver configuration: pins plus hardware settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverConfig {
    pub sck_init: PinInit,
    pub mosi_init: PinInit,
    pub miso_init: PinInit,
    pub cs_init: PinInit,
    pub hw_init: HardwareInit,
    /// Chip select is driven outside this driver
    pub external_cs: bool,
    pub validity: bool,
}

/// Completion callback, given the number of bytes moved.
pub type Callback = fn(usize);

/// One SPI channel.
pub trait Driver: Lockable + Send + Sync {
    /// Applies `config`. Fails with `INVAL_FUNC_PARAM` if it is not valid.
    fn init(&self, config: &DriverConfig) -> Status;

    fn deinit(&self) -> Status;

    fn set_chip_select(&self, state: gpio::State) -> Status;

    fn set_chip_select_control_mode(&self, mode: CsMode) -> Status;

    fn write_bytes(&self, tx: &[u8], timeout: Duration) -> Status;

    fn read_bytes(&self, rx: &mut [u8], timeout: Duration) -> Status;

    /// Full-duplex transfer. `tx` and `rx` must be the same length.
    fn read_write_bytes(&self, tx: &[u8], rx: &mut [u8], timeout: Duration) -> Status;

    fn set_peripheral_mode(&self, periph: SubPeripheral, mode: PeripheralMode) -> Status;

    /// Sets the clock as close to `freq` as the hardware allows.
    ///
    /// `tolerance` is in percent. Returns `CLOCK_SET_EQ` when the result is
    /// within tolerance, otherwise `CLOCK_SET_LT` or `CLOCK_SET_GT`.
    fn set_clock_frequency(&self, freq: ClockFreq, tolerance: u32) -> Status;

    fn get_clock_frequency(&self) -> Result<ClockFreq, Status>;

    fn on_write_complete(&self, _callback: Callback) -> Status {
        Status::NOT_SUPPORTED
    }

    fn on_read_complete(&self, _callback: Callback) -> Status {
        Status::NOT_SUPPORTED
    }

    fn on_read_write_complete(&self, _callback: Callback) -> Status {
        Status::NOT_SUPPORTED
    }

    fn on_error(&self, _callback: Callback) -> Status {
        Status::NOT_SUPPORTED
    }
}

/// Shared handle to a channel driver.
pub type DriverHandle = Arc<dyn Driver>;

/// Picks the clock to use from the frequencies a channel supports.
///
/// The highest supported frequency not above `requested` wins; if every
/// option is above it, the lowest one is used. The status tells how the
/// choice compares with the request given `tolerance` percent. Returns
/// `None` when `supported` is empty.
pub fn select_clock(
    supported: &[ClockFreq],
    requested: ClockFreq,
    tolerance: u32,
) -> Option<(ClockFreq, Status)> {
    let chosen = supported
        .iter()
        .copied()
        .filter(|&f| f <= requested)
        .max()
        .or_else(|| supported.iter().copied().min())?;

    let delta = u64::from(chosen.abs_diff(requested));
    let allowed = u64::from(requested) * u64::from(tolerance) / 100;

    let status = if delta <= allowed {
        codes::CLOCK_SET_EQ
    } else if chosen < requested {
        codes::CLOCK_SET_LT
    } else {
        codes::CLOCK_SET_GT
    };
    Some((chosen, status))
}

driver_registry! {
    /// SPI capability record.
    pub struct DriverRegistry {
        /// Looks up the driver for a channel
        pub get_driver: fn(Channel) -> Option<DriverHandle>,
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("spi", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

/// Registers the backend and brings it up.
pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

/// Driver for `channel`, or `None` if unbacked or out of range.
pub fn get_driver(channel: Channel) -> Option<DriverHandle> {
    FACADE.entry(|r| r.get_driver).and_then(|get| get(channel))
}

pub fn is_supported() -> bool {
    FACADE.is_supported()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MHZ: ClockFreq = 1_000_000;
    const OPTIONS: [ClockFreq; 4] = [MHZ, 2 * MHZ, 4 * MHZ, 8 * MHZ];

    #[test]
    fn clock_rounds_down_to_supported() {
        assert_eq!(
            select_clock(&OPTIONS, 7_500_000, 0),
            Some((4 * MHZ, codes::CLOCK_SET_LT))
        );
    }

    #[test]
    fn exact_match_is_eq() {
        assert_eq!(
            select_clock(&OPTIONS, 2 * MHZ, 0),
            Some((2 * MHZ, codes::CLOCK_SET_EQ))
        );
    }

    #[test]
    fn tolerance_accepts_nearby_clock() {
        // 8 MHz from 8.5 MHz is about 5.9% off.
        assert_eq!(
            select_clock(&OPTIONS, 8_500_000, 10),
            Some((8 * MHZ, Status::OK))
        );
        assert_eq!(
            select_clock(&OPTIONS, 8_500_000, 5),
            Some((8 * MHZ, codes::CLOCK_SET_LT))
        );
    }

    #[test]
    fn below_every_option_uses_lowest() {
        assert_eq!(
            select_clock(&OPTIONS, 500_000, 0),
            Some((MHZ, codes::CLOCK_SET_GT))
        );
        assert_eq!(select_clock(&[], MHZ, 0), None);
    }

    #[test]
    fn config_defaults_are_invalid() {
        let config = DriverConfig::default();
        assert!(!config.validity);
        assert!(!config.hw_init.validity);
        assert_eq!(config.hw_init.clock_freq, MHZ);
        assert_eq!(DataSize::Bits12.bits(), 12);
    }
}
