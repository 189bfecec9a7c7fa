//! Hardware-wide type enums shared by several facades.

use core::fmt;

/// Every peripheral class the facades cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeripheralType {
    Gpio,
    Spi,
    Uart,
    Usart,
    Dma,
    Timer,
    Watchdog,
    Usb,
    Interrupt,
}

impl PeripheralType {
    /// All peripheral types in facade order.
    pub const ALL: [PeripheralType; 9] = [
        Self::Gpio,
        Self::Spi,
        Self::Uart,
        Self::Usart,
        Self::Dma,
        Self::Timer,
        Self::Watchdog,
        Self::Usb,
        Self::Interrupt,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gpio => "gpio",
            Self::Spi => "spi",
            Self::Uart => "uart",
            Self::Usart => "usart",
            Self::Dma => "dma",
            Self::Timer => "timer",
            Self::Watchdog => "watchdog",
            Self::Usb => "usb",
            Self::Interrupt => "interrupt",
        }
    }
}

impl fmt::Display for PeripheralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a peripheral moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeripheralMode {
    /// The caller waits for completion
    #[default]
    Blocking,
    /// Completion is reported from an interrupt
    Interrupt,
    /// A DMA channel moves the data
    Dma,
}
