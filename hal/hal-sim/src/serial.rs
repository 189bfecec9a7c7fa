//! Simulated serial ports backing both the UART and USART facades.
//!
//! Each port is a loopback: bytes written to TX show up on RX. Channels
//! 0..=2 are UARTs, 3..=4 are USARTs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chimera::peripheral::PeripheralMode;
use chimera::serial::{BaudRate, Channel, Config, HardwareStatus, SerialDriver, SubPeripheral};
use chimera::status::serial as codes;
use chimera::{uart, usart, LightFlatMap, Status};
use chimera_threading::{Lockable, RecursiveTimedMutex};
use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

/// Bytes the receive FIFO holds before it overruns.
pub const RX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Uart,
    Usart,
}

static KINDS: LightFlatMap<Channel, Kind, 5> = LightFlatMap::new([
    (0, Kind::Uart),
    (1, Kind::Uart),
    (2, Kind::Uart),
    (3, Kind::Usart),
    (4, Kind::Usart),
]);

static SHARED: Lazy<LightFlatMap<Channel, Arc<SimSerial>, 5>> = Lazy::new(|| {
    LightFlatMap::new([
        (0, Arc::new(SimSerial::new(0))),
        (1, Arc::new(SimSerial::new(1))),
        (2, Arc::new(SimSerial::new(2))),
        (3, Arc::new(SimSerial::new(3))),
        (4, Arc::new(SimSerial::new(4))),
    ])
});

#[derive(Debug, Default)]
struct PortState {
    open: bool,
    config: Config,
    tx_mode: PeripheralMode,
    rx_mode: PeripheralMode,
    rx: VecDeque<u8>,
    hw: HardwareStatus,
}

/// Simulated serial port
#[derive(Debug)]
pub struct SimSerial {
    channel: Channel,
    mutex: RecursiveTimedMutex,
    state: Mutex<PortState>,
    rx_ready: Condvar,
}

impl SimSerial {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            mutex: RecursiveTimedMutex::new(),
            state: Mutex::new(PortState::default()),
            rx_ready: Condvar::new(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn baud(&self) -> BaudRate {
        self.state.lock().config.baud
    }

    /// Injects bytes on RX as if a remote device had sent them.
    pub fn inject(&self, data: &[u8]) {
        let mut state = self.state.lock();
        Self::push_rx(&mut state, data);
        drop(state);
        self.rx_ready.notify_all();
    }

    fn push_rx(state: &mut PortState, data: &[u8]) {
        for &byte in data {
            if state.rx.len() == RX_CAPACITY {
                state.rx.pop_front();
                state.hw.overrun = true;
            }
            state.rx.push_back(byte);
        }
        state.hw.async_ready = !state.rx.is_empty();
    }
}

impl Lockable for SimSerial {
    fn lockable_mutex(&self) -> &RecursiveTimedMutex {
        &self.mutex
    }
}

impl SerialDriver for SimSerial {
    fn begin(&self, tx_mode: PeripheralMode, rx_mode: PeripheralMode) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if !state.config.validity {
            return Status::NOT_INITIALIZED;
        }
        state.open = true;
        state.tx_mode = tx_mode;
        state.rx_mode = rx_mode;
        debug!("serial{}: open at {} baud", self.channel, state.config.baud.bps());
        Status::OK
    }

    fn end(&self) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        state.open = false;
        state.rx.clear();
        state.hw = HardwareStatus::default();
        Status::OK
    }

    fn configure(&self, config: &Config) -> Status {
        if !config.validity {
            return Status::INVAL_FUNC_PARAM;
        }
        let _guard = self.lock_guard();
        self.state.lock().config = *config;
        Status::OK
    }

    fn set_baud(&self, baud: BaudRate) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if !state.config.validity {
            return codes::FAILED_CONFIGURE;
        }
        state.config.baud = baud;
        Status::OK
    }

    fn set_mode(&self, periph: SubPeripheral, mode: PeripheralMode) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        match periph {
            SubPeripheral::Tx => state.tx_mode = mode,
            SubPeripheral::Rx => state.rx_mode = mode,
        }
        Status::OK
    }

    fn write(&self, data: &[u8], _timeout: Duration) -> Status {
        if data.len() > RX_CAPACITY {
            return codes::PACKET_TOO_LARGE_FOR_BUFFER;
        }
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if !state.open {
            return codes::NOT_READY;
        }
        Self::push_rx(&mut state, data);
        drop(state);
        self.rx_ready.notify_all();
        Status::OK
    }

    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Status> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        if !state.open {
            return Err(codes::NOT_READY);
        }
        if buffer.is_empty() {
            return Ok(0);
        }

        while state.rx.is_empty() {
            let timed_out = match deadline {
                Some(deadline) => self.rx_ready.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.rx_ready.wait(&mut state);
                    false
                }
            };
            if timed_out && state.rx.is_empty() {
                return Err(Status::TIMEOUT);
            }
        }

        let count = buffer.len().min(state.rx.len());
        for (slot, byte) in buffer.iter_mut().zip(state.rx.drain(..count)) {
            *slot = byte;
        }
        state.hw.async_ready = !state.rx.is_empty();
        Ok(count)
    }

    fn flush(&self, periph: SubPeripheral) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if periph == SubPeripheral::Rx {
            state.rx.clear();
            state.hw = HardwareStatus::default();
        }
        Status::OK
    }

    fn available(&self) -> usize {
        self.state.lock().rx.len()
    }

    fn status(&self) -> HardwareStatus {
        self.state.lock().hw
    }
}

/// Shared port for `channel`, regardless of its kind.
pub fn port(channel: Channel) -> Option<Arc<SimSerial>> {
    SHARED.get(&channel).cloned()
}

fn is_kind(channel: Channel, kind: Kind) -> bool {
    KINDS.get(&channel) == Some(&kind)
}

fn is_channel_uart(channel: Channel) -> bool {
    is_kind(channel, Kind::Uart)
}

fn is_channel_usart(channel: Channel) -> bool {
    is_kind(channel, Kind::Usart)
}

fn create_shared(channel: Channel, kind: Kind) -> Option<Arc<dyn SerialDriver>> {
    if !is_kind(channel, kind) {
        warn!("serial{}: not a {:?} channel", channel, kind);
        return None;
    }
    port(channel).map(|p| p as Arc<dyn SerialDriver>)
}

fn create_unique(channel: Channel, kind: Kind) -> Option<Box<dyn SerialDriver>> {
    if !is_kind(channel, kind) {
        warn!("serial{}: not a {:?} channel", channel, kind);
        return None;
    }
    Some(Box::new(SimSerial::new(channel)))
}

fn initialize() -> Status {
    Lazy::force(&SHARED);
    Status::OK
}

fn reset_kind(kind: Kind) -> Status {
    for (channel, port) in SHARED.iter() {
        if is_kind(*channel, kind) {
            port.end();
        }
    }
    Status::OK
}

fn reset_uarts() -> Status {
    reset_kind(Kind::Uart)
}

fn reset_usarts() -> Status {
    reset_kind(Kind::Usart)
}

fn shared_uart(channel: Channel) -> Option<uart::SharedDriver> {
    create_shared(channel, Kind::Uart)
}

fn unique_uart(channel: Channel) -> Option<uart::UniqueDriver> {
    create_unique(channel, Kind::Uart)
}

fn shared_usart(channel: Channel) -> Option<usart::SharedDriver> {
    create_shared(channel, Kind::Usart)
}

fn unique_usart(channel: Channel) -> Option<usart::UniqueDriver> {
    create_unique(channel, Kind::Usart)
}

/// Registration hook for the UART facade.
pub fn register_uart(registry: &mut uart::DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset_uarts);
    registry.is_channel_uart = Some(is_channel_uart);
    registry.create_shared = Some(shared_uart);
    registry.create_unique = Some(unique_uart);
    Status::OK
}

/// Registration hook for the USART facade.
pub fn register_usart(registry: &mut usart::DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset_usarts);
    registry.is_channel_usart = Some(is_channel_usart);
    registry.create_shared = Some(shared_usart);
    registry.create_unique = Some(unique_usart);
    Status::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn open(port: &SimSerial) {
        let config = Config {
            baud: BaudRate::Baud9600,
            validity: true,
            ..Config::default()
        };
        assert_eq!(port.configure(&config), Status::OK);
        assert_eq!(
            port.begin(PeripheralMode::Blocking, PeripheralMode::Blocking),
            Status::OK
        );
    }

    #[test]
    fn channel_kinds() {
        assert!(is_channel_uart(2));
        assert!(!is_channel_uart(3));
        assert!(is_channel_usart(4));
        assert!(!is_channel_usart(5));
        assert!(create_unique(3, Kind::Uart).is_none());
    }

    #[test]
    fn begin_requires_configuration() {
        let port = SimSerial::new(0);
        assert_eq!(
            port.begin(PeripheralMode::Blocking, PeripheralMode::Blocking),
            Status::NOT_INITIALIZED
        );
        assert_eq!(port.configure(&Config::default()), Status::INVAL_FUNC_PARAM);
        assert_eq!(port.write(b"x", Duration::ZERO), codes::NOT_READY);
    }

    #[test]
    fn written_bytes_loop_back() {
        let port = SimSerial::new(1);
        open(&port);
        assert_eq!(port.write(b"hello", Duration::ZERO), Status::OK);
        assert_eq!(port.available(), 5);

        let mut buf = [0u8; 3];
        assert_eq!(port.read(&mut buf, Duration::ZERO), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(port.read(&mut buf, Duration::ZERO), Ok(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(
            port.read(&mut buf, Duration::from_millis(5)),
            Err(Status::TIMEOUT)
        );
    }

    #[test]
    fn empty_buffer_read_returns_at_once() {
        let port = SimSerial::new(4);
        open(&port);

        let start = std::time::Instant::now();
        assert_eq!(port.read(&mut [], Duration::from_secs(5)), Ok(0));
        assert!(start.elapsed() < Duration::from_secs(1));

        port.inject(b"z");
        assert_eq!(port.read(&mut [], Duration::from_secs(5)), Ok(0));
        assert_eq!(port.available(), 1);
    }

    #[test]
    fn overrun_drops_oldest() {
        let port = SimSerial::new(2);
        open(&port);
        port.inject(&[1; RX_CAPACITY]);
        port.inject(&[2, 3]);
        assert!(port.status().overrun);
        assert_eq!(port.available(), RX_CAPACITY);

        assert_eq!(port.flush(SubPeripheral::Rx), Status::OK);
        assert_eq!(port.available(), 0);
        assert!(!port.status().overrun);
    }

    #[test]
    fn blocked_reader_wakes_on_data() {
        let port = Arc::new(SimSerial::new(3));
        open(&port);

        let reader = {
            let port = Arc::clone(&port);
            thread::spawn(move || {
                let mut buf = [0u8; 4];
                port.read(&mut buf, Duration::from_secs(5)).map(|n| buf[..n].to_vec())
            })
        };
        thread::sleep(Duration::from_millis(20));
        port.inject(b"ok");
        assert_eq!(reader.join().unwrap(), Ok(b"ok".to_vec()));
    }
}
