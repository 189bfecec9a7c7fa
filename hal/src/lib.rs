//! Chimera hardware abstraction layer
//!
//! Every peripheral is a facade module that forwards to whichever backend
//! registered itself for it. With no backend the facade still answers, with
//! [`Status::NOT_SUPPORTED`] or an empty value, so application code can run
//! on targets that lack a peripheral.
//!
//! ```
//! use chimera::{gpio, Status};
//!
//! assert_eq!(gpio::initialize(), Status::NOT_SUPPORTED);
//! assert!(gpio::get_driver(gpio::Port::A, 5).is_none());
//! ```
//!
//! Backends call `<facade>::backend::install(register_fn)` before the
//! application initializes the facade.

pub mod container;
pub mod dma;
pub mod gpio;
pub mod interrupt;
pub mod peripheral;
pub mod registry;
pub mod serial;
pub mod spi;
pub mod status;
pub mod timer;
pub mod uart;
pub mod usart;
pub mod usb;
pub mod watchdog;

pub use chimera_threading as threading;

pub use container::LightFlatMap;
pub use peripheral::{PeripheralMode, PeripheralType};
pub use registry::{Facade, RegisterFn, Registry};
pub use status::{Category, Status, StatusError};
