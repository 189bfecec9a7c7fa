//! Desktop simulation backend for the Chimera facades
//!
//! Provides a host driver for every peripheral facade so that application
//! code and tests run unchanged on a development machine.
//!
//! ## Simulated resources
//! - GPIO: ports A..G with 16 pins, port H with 2
//! - SPI: channels 0..=2, clocks of 1, 2, 4 and 8 MHz, MISO looped to MOSI
//! - UART: channels 0..=2; USART: channels 3..=4, loopback ports
//! - DMA: channels 0..=3, memory to memory only
//! - Timer: host monotonic clock
//! - Watchdog: channel 0, records kicks and forced timeouts
//! - USB: channel 0, with a simulated cable
//! - Interrupt: handler table raised through [`interrupt::trigger`]
//!
//! ## Example
//! ```
//! use chimera::{spi, Status};
//!
//! chimera_sim::register_all();
//! assert_eq!(chimera_sim::initialize_all(), Status::OK);
//! assert!(spi::get_driver(0).is_some());
//! ```

use chimera::{PeripheralType, Status};
use log::{error, info};

pub mod dma;
pub mod gpio;
pub mod interrupt;
pub mod serial;
pub mod spi;
pub mod timer;
pub mod usb;
pub mod watchdog;

/// Installs the simulation registration hook on every facade.
pub fn register_all() {
    chimera::gpio::backend::install(gpio::register_driver);
    chimera::spi::backend::install(spi::register_driver);
    chimera::uart::backend::install(serial::register_uart);
    chimera::usart::backend::install(serial::register_usart);
    chimera::dma::backend::install(dma::register_driver);
    chimera::timer::backend::install(timer::register_driver);
    chimera::watchdog::backend::install(watchdog::register_driver);
    chimera::usb::backend::install(usb::register_driver);
    chimera::interrupt::backend::install(interrupt::register_driver);
}

/// Initializes every facade, stopping at the first failure.
///
/// Returns `OK` when all facades came up.
pub fn initialize_all() -> Status {
    let steps: [(PeripheralType, fn() -> Status); 9] = [
        (PeripheralType::Gpio, chimera::gpio::initialize),
        (PeripheralType::Spi, chimera::spi::initialize),
        (PeripheralType::Uart, chimera::uart::initialize),
        (PeripheralType::Usart, chimera::usart::initialize),
        (PeripheralType::Dma, chimera::dma::initialize),
        (PeripheralType::Timer, chimera::timer::initialize),
        (PeripheralType::Watchdog, chimera::watchdog::initialize),
        (PeripheralType::Usb, chimera::usb::initialize),
        (PeripheralType::Interrupt, chimera::interrupt::initialize),
    ];

    for (periph, initialize) in steps {
        let status = initialize();
        if status != Status::OK {
            error!("sim: {} failed to initialize: {}", periph, status);
            return status;
        }
    }
    info!("sim: all peripherals up");
    Status::OK
}
