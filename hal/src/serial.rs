//! Serial types and the driver interface shared by UART and USART.

use std::time::Duration;

use chimera_threading::Lockable;

use crate::peripheral::PeripheralMode;
use crate::status::Status;

/// Hardware channel.
pub type Channel = u8;

/// Standard baud rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum BaudRate {
    Baud110 = 110,
    Baud150 = 150,
    Baud300 = 300,
    Baud1200 = 1_200,
    Baud2400 = 2_400,
    Baud4800 = 4_800,
    Baud9600 = 9_600,
    Baud19200 = 19_200,
    Baud38400 = 38_400,
    Baud57600 = 57_600,
    #[default]
    Baud115200 = 115_200,
    Baud230400 = 230_400,
    Baud460800 = 460_800,
    Baud921600 = 921_600,
}

impl BaudRate {
    pub const ALL: [BaudRate; 14] = [
        BaudRate::Baud110,
        BaudRate::Baud150,
        BaudRate::Baud300,
        BaudRate::Baud1200,
        BaudRate::Baud2400,
        BaudRate::Baud4800,
        BaudRate::Baud9600,
        BaudRate::Baud19200,
        BaudRate::Baud38400,
        BaudRate::Baud57600,
        BaudRate::Baud115200,
        BaudRate::Baud230400,
        BaudRate::Baud460800,
        BaudRate::Baud921600,
    ];

    /// Bits per second.
    pub const fn bps(self) -> u32 {
        self as u32
    }

    /// Exact match on a standard rate.
    pub fn from_bps(bps: u32) -> Option<BaudRate> {
        Self::ALL.iter().copied().find(|rate| rate.bps() == bps)
    }
}

/// Character width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CharWidth {
    #[default]
    Bits8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Half of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubPeripheral {
    Rx,
    Tx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    AsyncReadComplete,
    WriteComplete,
}

/// Hardware error flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareStatus {
    pub overrun: bool,
    pub error: bool,
    pub async_ready: bool,
}

/// Line configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub baud: BaudRate,
    pub width: CharWidth,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow: FlowControl,
    pub validity: bool,
}

/// One serial channel.
///
/// Every operation reports a [`Status`]; a driver that has not been
/// configured answers `NOT_INITIALIZED`.
pub trait SerialDriver: Lockable + Send + Sync {
    /// Claims the channel with the given transfer modes.
    fn begin(&self, tx_mode: PeripheralMode, rx_mode: PeripheralMode) -> Status;

    fn end(&self) -> Status;

    /// Fails with `INVAL_FUNC_PARAM` if `config` is not valid.
    fn configure(&self, config: &Config) -> Status;

    fn set_baud(&self, baud: BaudRate) -> Status;

    fn set_mode(&self, periph: SubPeripheral, mode: PeripheralMode) -> Status;

    fn write(&self, data: &[u8], timeout: Duration) -> Status;

    /// Reads up to `buffer.len()` bytes, returning how many arrived.
    ///
    /// An empty buffer returns `Ok(0)` without waiting.
    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Status>;

    fn flush(&self, periph: SubPeripheral) -> Status;

    /// Bytes waiting to be read.
    fn available(&self) -> usize;

    fn status(&self) -> HardwareStatus;
}
