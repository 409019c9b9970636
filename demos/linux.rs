//! Example that runs on Linux using a serial-USB-adapter.
//!
//! Connects to the MQTT broker, announces the device and publishes the uptime counter every minute.
//! Lines typed on stdin are forwarded to the modem, modem output is printed on stdout.
use std::{
    env,
    io::{self, Read as _, Write as _},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::Duration,
};

use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use esp_at_mqtt::{
    adapter::Adapter,
    bridge::Bridge,
    config::Config,
    device::{DeviceProfile, DEFAULT_BASE_TOPIC, DEFAULT_DISCOVERY_PREFIX, DEFAULT_NAME, DEFAULT_UNIQUE_ID},
    gate::CancellationToken,
    session::{Session, SessionConfig, DEFAULT_BROKER_PORT},
};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

// Timer frequency in Hz
const TIMER_HZ: u32 = 1000;

const DEFAULT_BROKER: &str = "10.0.0.167";

/// Set once stdin is closed
static CANCEL: CancellationToken = CancellationToken::new();

fn main() {
    env_logger::init();

    // Parse args
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        println!("Usage: {} <path-to-serial> <baudrate> [broker-host]", args[0]);
        println!("Example: {} /dev/ttyUSB0 115200 {}", args[0], DEFAULT_BROKER);
        println!("\nNote: To run the example with debug logging, run it like this:");
        println!("\n  RUST_LOG=debug cargo run --example linux -- /dev/ttyUSB0 115200");
        std::process::exit(1);
    }
    let dev = &args[1];
    let baud_rate: u32 = args[2].parse().expect("Invalid baudrate");
    let broker = args.get(3).map(String::as_str).unwrap_or(DEFAULT_BROKER);

    println!("Starting (dev={}, baud={:?}, broker={})...", dev, baud_rate, broker);

    // Open serial port
    let serial = serialport::new(dev, baud_rate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(500))
        .open()
        .expect("Could not open serial port");

    let mut modem = SerialTransport(serial);
    modem.flush_input();

    let config = Config::default();
    let device = DeviceProfile::new(DEFAULT_NAME, DEFAULT_UNIQUE_ID, DEFAULT_BASE_TOPIC, DEFAULT_DISCOVERY_PREFIX)
        .expect("Invalid device topics");

    let adapter: Adapter<_, _, TIMER_HZ> = Adapter::with_config(modem, timer::SysTimer::new(), &config);
    let session = Session::new(SessionConfig::for_device(&device, broker, DEFAULT_BROKER_PORT));

    let mut bridge = Bridge::new(adapter, Console::spawn(), session, &device, &config);
    if let Err(error) = bridge.run(&CANCEL) {
        log::error!("Bridge stopped: {:?}", error);
        std::process::exit(2);
    }

    println!("Stdin closed, bye");
}

/// Serial port exposed through the embedded-io traits
struct SerialTransport(Box<dyn SerialPort>);

impl SerialTransport {
    /// Flush the serial port receive buffer.
    fn flush_input(&mut self) {
        if let Err(e) = self.0.clear(serialport::ClearBuffer::Input) {
            log::warn!("Could not flush serial input: {}", e);
        }
    }
}

impl ErrorType for SerialTransport {
    type Error = ErrorKind;
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.read(buf).map_err(map_io_error)
    }
}

impl ReadReady for SerialTransport {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let pending = self.0.bytes_to_read().map_err(|_| ErrorKind::Other)?;
        Ok(pending > 0)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf).map_err(map_io_error)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().map_err(map_io_error)
    }
}

fn map_io_error(error: io::Error) -> ErrorKind {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::TimedOut,
        io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        _ => ErrorKind::Other,
    }
}

/// Stdin/stdout console. Stdin is read by a background thread, as it can't be polled.
struct Console {
    input: Receiver<u8>,
    peeked: Option<u8>,
}

impl Console {
    fn spawn() -> Self {
        let (sender, input) = mpsc::channel();

        thread::Builder::new()
            .name("stdin_read".to_string())
            .spawn(move || {
                for byte in io::stdin().bytes() {
                    match byte {
                        // Terminal sends LF only, the modem expects CR which gets expanded to CRLF
                        Ok(b'\n') => {
                            let _ = sender.send(b'\r');
                        }
                        Ok(byte) => {
                            let _ = sender.send(byte);
                        }
                        Err(e) => {
                            log::error!("Stdin reading thread error while reading: {}", e);
                            break;
                        }
                    }
                }

                CANCEL.cancel();
            })
            .expect("Could not spawn stdin thread");

        Self { input, peeked: None }
    }
}

impl ErrorType for Console {
    type Error = ErrorKind;
}

impl ReadReady for Console {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.peeked.is_none() {
            match self.input.try_recv() {
                Ok(byte) => self.peeked = Some(byte),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }

        Ok(self.peeked.is_some())
    }
}

impl Read for Console {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let byte = match self.peeked.take() {
            Some(byte) => byte,
            None => self.input.recv().map_err(|_| ErrorKind::BrokenPipe)?,
        };

        buf[0] = byte;
        Ok(1)
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        io::stdout().write(buf).map_err(map_io_error)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        io::stdout().flush().map_err(map_io_error)
    }
}

mod timer {
    use std::{convert::TryInto, time::Instant as StdInstant};

    use fugit::Instant;
    use fugit_timer::Timer;

    /// A timer with millisecond precision.
    pub struct SysTimer {
        epoch: StdInstant,
        start: StdInstant,
        duration_ms: u32,
        started: bool,
    }

    impl SysTimer {
        pub fn new() -> SysTimer {
            let now = StdInstant::now();

            SysTimer {
                epoch: now,
                start: now,
                duration_ms: 0,
                started: false,
            }
        }
    }

    impl Timer<1000> for SysTimer {
        type Error = &'static str;

        /// Milliseconds since creation of the timer, not affected by start()
        fn now(&mut self) -> fugit::TimerInstantU32<1000> {
            let milliseconds = (StdInstant::now() - self.epoch).as_millis();
            let ticks: u32 = milliseconds.try_into().expect("u32 timer overflow");
            Instant::<u32, 1, 1000>::from_ticks(ticks)
        }

        /// Start timer with a `duration`
        fn start(&mut self, duration: fugit::TimerDurationU32<1000>) -> Result<(), Self::Error> {
            self.start = StdInstant::now();
            self.duration_ms = duration.ticks();
            self.started = true;

            Ok(())
        }

        /// Tries to stop this timer.
        ///
        /// An error will be returned if the timer has already been canceled or was never started.
        fn cancel(&mut self) -> Result<(), Self::Error> {
            if !self.started {
                Err("cannot cancel stopped timer")
            } else {
                self.started = false;
                Ok(())
            }
        }

        /// Must return `nb::Error::WouldBlock` if timer `duration` is not yet over.
        fn wait(&mut self) -> nb::Result<(), Self::Error> {
            let now = StdInstant::now();
            if (now - self.start).as_millis() > self.duration_ms.into() {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_delay() {
            let mut timer = SysTimer::new();

            // Wait 500 ms
            let before = StdInstant::now();
            timer.start(fugit::Duration::<u32, 1, 1000>::from_ticks(500)).unwrap();
            nb::block!(timer.wait()).unwrap();
            let after = StdInstant::now();

            let duration_ms = (after - before).as_millis();
            assert!(duration_ms >= 500);
            assert!(duration_ms < 1000);
        }
    }
}
