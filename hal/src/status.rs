//! Status codes.
//!
//! Every facade operation reports a 16-bit [`Status`]. The code space is
//! flat: a common range shared by all peripherals, then one range per
//! peripheral starting at its offset. Peripheral codes always lie strictly
//! above their offset and below the next one.

use core::fmt;

use thiserror::Error;

use crate::container::LightFlatMap;

/// Result code of a peripheral operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Status(pub u16);

impl Status {
    /// Don't know what went wrong
    pub const UNKNOWN_ERROR: Status = Status(0);
    /// Everything is fine
    pub const OK: Status = Status(1);
    /// The system has not been initialized yet
    pub const NOT_INITIALIZED: Status = Status(2);
    /// The resource is locked
    pub const LOCKED: Status = Status(3);
    /// An exception was raised
    pub const EXCEPTION: Status = Status(4);
    /// An operation timed out
    pub const TIMEOUT: Status = Status(5);
    /// The functionality is not enabled or not backed
    pub const NOT_SUPPORTED: Status = Status(10);
    /// The system is not ready yet
    pub const NOT_READY: Status = Status(11);
    /// A transmission is in progress
    pub const TX_IN_PROGRESS: Status = Status(12);
    /// A reception is in progress
    pub const RX_IN_PROGRESS: Status = Status(13);
    /// The resource is busy
    pub const BUSY: Status = Status(14);
    /// A parameter was invalid
    pub const INVAL_FUNC_PARAM: Status = Status(15);
    /// Generic failure
    pub const FAIL: Status = Status(30);
    /// An initialization sequence failed
    pub const FAILED_INIT: Status = Status(31);
    /// Could not lock a resource
    pub const FAILED_LOCK: Status = Status(32);
    /// Could not release a locked resource
    pub const FAILED_RELEASE: Status = Status(33);

    /// Every common code.
    pub const COMMON: [Status; 16] = [
        Self::UNKNOWN_ERROR,
        Self::OK,
        Self::NOT_INITIALIZED,
        Self::LOCKED,
        Self::EXCEPTION,
        Self::TIMEOUT,
        Self::NOT_SUPPORTED,
        Self::NOT_READY,
        Self::TX_IN_PROGRESS,
        Self::RX_IN_PROGRESS,
        Self::BUSY,
        Self::INVAL_FUNC_PARAM,
        Self::FAIL,
        Self::FAILED_INIT,
        Self::FAILED_LOCK,
        Self::FAILED_RELEASE,
    ];

    #[inline]
    pub const fn code(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }

    /// Returns true for codes in the shared range.
    pub fn is_common(self) -> bool {
        Self::COMMON.contains(&self)
    }

    /// Taxonomy bucket of this code.
    pub fn category(self) -> Category {
        DESCRIPTIONS.value(&self).1
    }

    /// Symbolic name, or `"UNRECOGNIZED"`.
    pub fn name(self) -> &'static str {
        match DESCRIPTIONS.get(&self) {
            Some((name, _)) => *name,
            None => "UNRECOGNIZED",
        }
    }

    /// `Ok(())` for [`Status::OK`], otherwise a [`StatusError`].
    pub fn into_result(self) -> Result<(), StatusError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(StatusError {
                status: self,
                category: self.category(),
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({}={})", self.name(), self.0)
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> u16 {
        status.0
    }
}

/// Error side of [`Status::into_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{status} [{category}]")]
pub struct StatusError {
    pub status: Status,
    pub category: Category,
}

impl From<StatusError> for Status {
    fn from(err: StatusError) -> Status {
        err.status
    }
}

/// Status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    /// OK and its aliases
    Success,
    /// Not initialized, not ready, failed init
    Lifecycle,
    /// Invalid arguments or configuration
    Parameter,
    /// Contention and timeouts
    Resource,
    /// Functionality not available
    Capability,
    /// An operation failed or is still running
    Operation,
    /// Exceptions and unknown errors
    Catastrophe,
    /// Not a known code
    #[default]
    Unrecognized,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Lifecycle => "lifecycle",
            Self::Parameter => "parameter",
            Self::Resource => "resource",
            Self::Capability => "capability",
            Self::Operation => "operation",
            Self::Catastrophe => "catastrophe",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Start of each peripheral code range.
pub mod offset {
    pub const GPIO: u16 = 100;
    pub const SPI: u16 = 200;
    pub const SERIAL: u16 = 300;
    pub const TIMER: u16 = 400;
    pub const DMA: u16 = 500;
    pub const WATCHDOG: u16 = 600;
    pub const USB: u16 = 700;
    pub const INTERRUPT: u16 = 800;
    pub const MEMORY_FLASH: u16 = 1000;

    /// All offsets in ascending order.
    pub const ALL: [u16; 9] = [
        GPIO,
        SPI,
        SERIAL,
        TIMER,
        DMA,
        WATCHDOG,
        USB,
        INTERRUPT,
        MEMORY_FLASH,
    ];
}

/// GPIO codes. The common codes currently suffice.
pub mod gpio {
    use super::Status;

    pub const OFFSET: u16 = super::offset::GPIO;
    pub const ALL: [Status; 0] = [];
}

/// SPI codes.
pub mod spi {
    use super::Status;

    pub const OFFSET: u16 = super::offset::SPI;

    pub const PACKET_TOO_LARGE_FOR_BUFFER: Status = Status(OFFSET + 1);
    pub const FAILED_CONVERSION: Status = Status(OFFSET + 2);
    pub const INVALID_HARDWARE_PARAM: Status = Status(OFFSET + 3);
    pub const FAILED_CHIP_SELECT_WRITE: Status = Status(OFFSET + 4);
    /// Clock was set below the request
    pub const CLOCK_SET_LT: Status = Status(OFFSET + 5);
    /// Clock was set above the request
    pub const CLOCK_SET_GT: Status = Status(OFFSET + 6);
    /// Clock matches the request within tolerance
    pub const CLOCK_SET_EQ: Status = Status::OK;
    pub const TRANSFER_COMPLETE: Status = Status(OFFSET + 7);
    pub const TRANSFER_IN_PROGRESS: Status = Status(OFFSET + 8);
    pub const TRANSFER_ERROR: Status = Status(OFFSET + 9);

    /// Codes owned by this range (aliases excluded).
    pub const ALL: [Status; 9] = [
        PACKET_TOO_LARGE_FOR_BUFFER,
        FAILED_CONVERSION,
        INVALID_HARDWARE_PARAM,
        FAILED_CHIP_SELECT_WRITE,
        CLOCK_SET_LT,
        CLOCK_SET_GT,
        TRANSFER_COMPLETE,
        TRANSFER_IN_PROGRESS,
        TRANSFER_ERROR,
    ];
}

/// Serial (UART and USART) codes.
pub mod serial {
    use super::Status;

    pub const OFFSET: u16 = super::offset::SERIAL;

    pub const TX_IN_PROGRESS: Status = Status(OFFSET + 3);
    pub const RX_IN_PROGRESS: Status = Status(OFFSET + 4);
    pub const RX_COMPLETE: Status = Status(OFFSET + 5);
    pub const NOT_READY: Status = Status(OFFSET + 6);
    pub const PACKET_TOO_LARGE_FOR_BUFFER: Status = Status(OFFSET + 7);
    pub const FAILED_WRITE: Status = Status(OFFSET + 11);
    pub const FAILED_READ: Status = Status(OFFSET + 12);
    pub const FAILED_OPEN: Status = Status(OFFSET + 13);
    pub const FAILED_CONFIGURE: Status = Status(OFFSET + 14);

    pub const ALL: [Status; 9] = [
        TX_IN_PROGRESS,
        RX_IN_PROGRESS,
        RX_COMPLETE,
        NOT_READY,
        PACKET_TOO_LARGE_FOR_BUFFER,
        FAILED_WRITE,
        FAILED_READ,
        FAILED_OPEN,
        FAILED_CONFIGURE,
    ];
}

/// Timer codes. The common codes currently suffice.
pub mod timer {
    use super::Status;

    pub const OFFSET: u16 = super::offset::TIMER;
    pub const ALL: [Status; 0] = [];
}

/// DMA codes.
pub mod dma {
    use super::Status;

    pub const OFFSET: u16 = super::offset::DMA;

    pub const TRANSFER_IN_PROGRESS: Status = Status(OFFSET + 1);
    pub const TRANSFER_COMPLETE: Status = Status(OFFSET + 2);
    pub const TRANSFER_ERROR: Status = Status(OFFSET + 3);

    pub const ALL: [Status; 3] = [TRANSFER_IN_PROGRESS, TRANSFER_COMPLETE, TRANSFER_ERROR];
}

/// Watchdog codes.
pub mod watchdog {
    use super::Status;

    pub const OFFSET: u16 = super::offset::WATCHDOG;

    /// Requested timeout cannot be produced by the hardware
    pub const TIMEOUT_OUT_OF_RANGE: Status = Status(OFFSET + 1);

    pub const ALL: [Status; 1] = [TIMEOUT_OUT_OF_RANGE];
}

/// USB codes. The common codes currently suffice.
pub mod usb {
    use super::Status;

    pub const OFFSET: u16 = super::offset::USB;
    pub const ALL: [Status; 0] = [];
}

/// Interrupt codes. The common codes currently suffice.
pub mod interrupt {
    use super::Status;

    pub const OFFSET: u16 = super::offset::INTERRUPT;
    pub const ALL: [Status; 0] = [];
}

use Category::*;

static DESCRIPTIONS: LightFlatMap<Status, (&'static str, Category), 38> = LightFlatMap::new([
    (Status::UNKNOWN_ERROR, ("UNKNOWN_ERROR", Catastrophe)),
    (Status::OK, ("OK", Success)),
    (Status::NOT_INITIALIZED, ("NOT_INITIALIZED", Lifecycle)),
    (Status::LOCKED, ("LOCKED", Resource)),
    (Status::EXCEPTION, ("EXCEPTION", Catastrophe)),
    (Status::TIMEOUT, ("TIMEOUT", Resource)),
    (Status::NOT_SUPPORTED, ("NOT_SUPPORTED", Capability)),
    (Status::NOT_READY, ("NOT_READY", Lifecycle)),
    (Status::TX_IN_PROGRESS, ("TX_IN_PROGRESS", Operation)),
    (Status::RX_IN_PROGRESS, ("RX_IN_PROGRESS", Operation)),
    (Status::BUSY, ("BUSY", Resource)),
    (Status::INVAL_FUNC_PARAM, ("INVAL_FUNC_PARAM", Parameter)),
    (Status::FAIL, ("FAIL", Operation)),
    (Status::FAILED_INIT, ("FAILED_INIT", Lifecycle)),
    (Status::FAILED_LOCK, ("FAILED_LOCK", Resource)),
    (Status::FAILED_RELEASE, ("FAILED_RELEASE", Resource)),
    (spi::PACKET_TOO_LARGE_FOR_BUFFER, ("SPI_PACKET_TOO_LARGE_FOR_BUFFER", Parameter)),
    (spi::FAILED_CONVERSION, ("SPI_FAILED_CONVERSION", Operation)),
    (spi::INVALID_HARDWARE_PARAM, ("SPI_INVALID_HARDWARE_PARAM", Parameter)),
    (spi::FAILED_CHIP_SELECT_WRITE, ("SPI_FAILED_CHIP_SELECT_WRITE", Operation)),
    (spi::CLOCK_SET_LT, ("SPI_CLOCK_SET_LT", Operation)),
    (spi::CLOCK_SET_GT, ("SPI_CLOCK_SET_GT", Operation)),
    (spi::TRANSFER_COMPLETE, ("SPI_TRANSFER_COMPLETE", Operation)),
    (spi::TRANSFER_IN_PROGRESS, ("SPI_TRANSFER_IN_PROGRESS", Operation)),
    (spi::TRANSFER_ERROR, ("SPI_TRANSFER_ERROR", Operation)),
    (serial::TX_IN_PROGRESS, ("SERIAL_TX_IN_PROGRESS", Operation)),
    (serial::RX_IN_PROGRESS, ("SERIAL_RX_IN_PROGRESS", Operation)),
    (serial::RX_COMPLETE, ("SERIAL_RX_COMPLETE", Operation)),
    (serial::NOT_READY, ("SERIAL_NOT_READY", Lifecycle)),
    (serial::PACKET_TOO_LARGE_FOR_BUFFER, ("SERIAL_PACKET_TOO_LARGE_FOR_BUFFER", Parameter)),
    (serial::FAILED_WRITE, ("SERIAL_FAILED_WRITE", Operation)),
    (serial::FAILED_READ, ("SERIAL_FAILED_READ", Operation)),
    (serial::FAILED_OPEN, ("SERIAL_FAILED_OPEN", Operation)),
    (serial::FAILED_CONFIGURE, ("SERIAL_FAILED_CONFIGURE", Operation)),
    (dma::TRANSFER_IN_PROGRESS, ("DMA_TRANSFER_IN_PROGRESS", Operation)),
    (dma::TRANSFER_COMPLETE, ("DMA_TRANSFER_COMPLETE", Operation)),
    (dma::TRANSFER_ERROR, ("DMA_TRANSFER_ERROR", Operation)),
    (watchdog::TIMEOUT_OUT_OF_RANGE, ("WATCHDOG_TIMEOUT_OUT_OF_RANGE", Parameter)),
]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_set_eq_aliases_ok() {
        assert_eq!(spi::CLOCK_SET_EQ, Status::OK);
        assert!(spi::CLOCK_SET_EQ.is_ok());
        assert_eq!(spi::CLOCK_SET_EQ.category(), Category::Success);
    }

    #[test]
    fn taxonomy() {
        assert_eq!(Status::NOT_SUPPORTED.category(), Category::Capability);
        assert_eq!(Status::FAILED_INIT.category(), Category::Lifecycle);
        assert_eq!(Status::INVAL_FUNC_PARAM.category(), Category::Parameter);
        assert_eq!(Status::FAILED_RELEASE.category(), Category::Resource);
        assert_eq!(spi::CLOCK_SET_GT.category(), Category::Operation);
        assert_eq!(Status::EXCEPTION.category(), Category::Catastrophe);
        assert_eq!(Status(999).category(), Category::Unrecognized);
    }

    #[test]
    fn names_and_display() {
        assert_eq!(Status::OK.name(), "OK");
        assert_eq!(spi::CLOCK_SET_LT.name(), "SPI_CLOCK_SET_LT");
        assert_eq!(Status(4242).name(), "UNRECOGNIZED");
        assert_eq!(Status::TIMEOUT.to_string(), "TIMEOUT (5)");
        assert_eq!(format!("{:?}", Status::BUSY), "Status(BUSY=14)");
    }

    #[test]
    fn into_result_bridges_to_errors() {
        assert_eq!(Status::OK.into_result(), Ok(()));

        let err = Status::TIMEOUT.into_result().unwrap_err();
        assert_eq!(err.status, Status::TIMEOUT);
        assert_eq!(err.category, Category::Resource);
        assert_eq!(err.to_string(), "TIMEOUT (5) [resource]");
        assert_eq!(Status::from(err), Status::TIMEOUT);
    }

    #[test]
    fn every_code_is_described() {
        let described = Status::COMMON
            .iter()
            .chain(spi::ALL.iter())
            .chain(serial::ALL.iter())
            .chain(dma::ALL.iter())
            .chain(watchdog::ALL.iter())
            .count();
        assert_eq!(described, DESCRIPTIONS.size());
        assert!(DESCRIPTIONS
            .iter()
            .all(|(status, (name, _))| status.name() == *name));
    }
}
