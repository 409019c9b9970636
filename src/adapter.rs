//! # AT command driver
//!
//! Synchronous request/response driver for the MQTT/WIFI subset of ESP-AT. Every operation writes a single
//! command, collects the response within the configured window and scans it for the expected token.
//!
//! The driver never retries. Retry and backoff decisions are taken by the [ConnectivityGate](crate::gate::ConnectivityGate)
//! and the [Session](crate::session::Session).
//!
//! ## Example
//!
//! ````ignore
//! let mut adapter: Adapter<_, _, 1_000_000> = Adapter::new(uart, timer);
//!
//! adapter.check_wifi_association()?;
//! adapter.mqtt_configure_user(ConnectionScheme::Tcp, "rp2040")?;
//! adapter.mqtt_configure_connection("home/nodes/sensor/rp2040/status", "offline")?;
//! adapter.mqtt_connect("10.0.0.167", 1883)?;
//! adapter.mqtt_publish("home/nodes/sensor/rp2040/status", b"online")?;
//! ````
use crate::buffer::{ResponseBuffer, RESPONSE_BUFFER_SIZE};
use crate::commands::{
    BrokerConnectCommand, CleanCommand, ConnectionConfigCommand, ConnectionScheme, ExpectedResponse,
    PublishRawCommand, UserConfigCommand, WifiStatusCommand, COMMAND_BUFFER_SIZE,
};
use crate::config::Config;
use crate::transport::Transport;
use atat::AtatCmd;
use embedded_io::ErrorKind;
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use log::{debug, trace};

/// Byte sent by the modem once it is ready to receive raw payload data
pub const PROMPT: u8 = b'>';

const LF: u8 = b'\n';

/// Outcome of a failed exchange
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Nothing was received within the response window
    Timeout,

    /// Modem responded with ERROR or FAIL
    ErrorResponse,

    /// Response neither contained the expected token nor an error token
    UnexpectedResponse,

    /// Modem did not send the '>' prompt within the prompt timeout
    PromptTimeout,

    /// Command arguments exceed the command buffer
    CommandOverflow,

    /// Underlying serial channel failed
    TransportError(ErrorKind),

    /// Upstream timer error
    TimerError,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::TransportError(kind)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Timeout => defmt::write!(f, "Error::Timeout"),
            Error::ErrorResponse => defmt::write!(f, "Error::ErrorResponse"),
            Error::UnexpectedResponse => defmt::write!(f, "Error::UnexpectedResponse"),
            Error::PromptTimeout => defmt::write!(f, "Error::PromptTimeout"),
            Error::CommandOverflow => defmt::write!(f, "Error::CommandOverflow"),
            Error::TransportError(e) => defmt::write!(f, "Error::TransportError({})", defmt::Debug2Format(e)),
            Error::TimerError => defmt::write!(f, "Error::TimerError"),
        }
    }
}

/// Central driver for the modem
///
/// Owns the serial transport, so at most one command/response exchange can be in flight.
pub struct Adapter<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32> {
    /// Serial channel to the modem
    pub(crate) transport: P,

    /// Timer used for timeout measurement and delays
    pub(crate) timer: T,

    /// Window for collecting a command response
    pub(crate) response_timeout: TimerDurationU32<TIMER_HZ>,

    /// Max. time to wait for the publish prompt
    pub(crate) prompt_timeout: TimerDurationU32<TIMER_HZ>,
}

impl<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32> Adapter<P, T, TIMER_HZ> {
    /// Creates a new driver using the default timing
    pub fn new(transport: P, timer: T) -> Self {
        Self::with_config(transport, timer, &Config::default())
    }

    /// Creates a new driver using the timing of the given configuration
    pub fn with_config(transport: P, timer: T, config: &Config) -> Self {
        Self {
            transport,
            timer,
            response_timeout: TimerDurationU32::millis(config.response_timeout_ms),
            prompt_timeout: TimerDurationU32::millis(config.prompt_timeout_ms),
        }
    }

    /// Collects one response window and scans it for the given pattern
    pub fn wait_for(&mut self, pattern: &[u8]) -> Result<(), Error> {
        let mut buffer: ResponseBuffer<RESPONSE_BUFFER_SIZE> = ResponseBuffer::new();
        let response = buffer.read_line(&mut self.transport, &mut self.timer, self.response_timeout)?;
        trace!("Received {} bytes: {:?}", response.len(), Printable(response));

        buffer.expect(pattern).map(|_| ())
    }

    /// Succeeds if the modem is associated with an access point
    pub fn check_wifi_association(&mut self) -> Result<(), Error> {
        self.send_command(&WifiStatusCommand)
    }

    /// Configures the MQTT client id and connection scheme
    pub fn mqtt_configure_user(&mut self, scheme: ConnectionScheme, client_id: &str) -> Result<(), Error> {
        self.send_command(&UserConfigCommand::new(scheme, client_id)?)
    }

    /// Configures the last will message
    pub fn mqtt_configure_connection(&mut self, lwt_topic: &str, lwt_payload: &str) -> Result<(), Error> {
        self.send_command(&ConnectionConfigCommand::new(lwt_topic, lwt_payload)?)
    }

    /// Connects to the given broker
    pub fn mqtt_connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        self.send_command(&BrokerConnectCommand::new(host, port)?)
    }

    /// Closes the MQTT connection
    pub fn mqtt_clean(&mut self) -> Result<(), Error> {
        self.send_command(&CleanCommand::new())
    }

    /// Publishes the payload as raw data
    ///
    /// The payload is not written before the modem sent the '>' prompt. Bytes received while waiting for
    /// the prompt are discarded, an ERROR or FAIL line fails the publish with [Error::ErrorResponse].
    pub fn mqtt_publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error> {
        let command = PublishRawCommand::new(topic, payload.len())?;
        self.write_command(&command)?;
        self.wait_for_prompt()?;

        trace!("Streaming {} payload bytes", payload.len());
        self.transport.write_all(payload)?;
        self.transport.flush()?;

        self.wait_for(PublishRawCommand::EXPECTED)
    }

    /// Returns the current timer instant
    pub fn now(&mut self) -> TimerInstantU32<TIMER_HZ> {
        self.timer.now()
    }

    /// Returns the serial channel, e.g. for forwarding unsolicited modem output
    pub fn transport_mut(&mut self) -> &mut P {
        &mut self.transport
    }

    /// Sets the window for collecting command responses in ms
    pub fn set_response_timeout_ms(&mut self, timeout: u32) {
        self.response_timeout = TimerDurationU32::millis(timeout);
    }

    /// Sets the max. time to wait for the publish prompt in ms
    pub fn set_prompt_timeout_ms(&mut self, timeout: u32) {
        self.prompt_timeout = TimerDurationU32::millis(timeout);
    }

    /// Sends a command and checks the response for the expected token
    pub(crate) fn send_command<Cmd: AtatCmd + ExpectedResponse>(&mut self, command: &Cmd) -> Result<(), Error> {
        self.write_command(command)?;
        self.wait_for(Cmd::EXPECTED)
    }

    /// Encodes and writes the command
    fn write_command<Cmd: AtatCmd>(&mut self, command: &Cmd) -> Result<(), Error> {
        let mut line = [0x0; COMMAND_BUFFER_SIZE];
        let length = command.write(&mut line);
        debug!("Sending command: {:?}", Printable(&line[..length]));

        self.transport.write_all(&line[..length])?;
        self.transport.flush()?;
        Ok(())
    }

    /// Blocks until the '>' prompt was received or the prompt timeout elapsed
    ///
    /// Other received lines are discarded. A line containing ERROR or FAIL ends the wait early, as the
    /// modem rejected the publish and won't send the prompt anymore.
    fn wait_for_prompt(&mut self) -> Result<(), Error> {
        let mut line: ResponseBuffer<RESPONSE_BUFFER_SIZE> = ResponseBuffer::new();
        self.timer.start(self.prompt_timeout).map_err(|_| Error::TimerError)?;

        loop {
            while self.transport.byte_available()? {
                match self.transport.read_byte()? {
                    PROMPT => return Ok(()),
                    LF if line.has_error_token() => {
                        trace!("Publish rejected: {:?}", Printable(line.as_slice()));
                        return Err(Error::ErrorResponse);
                    }
                    LF => line.clear(),
                    byte => line.push(byte),
                }
            }

            match self.timer.wait() {
                Ok(_) => return Err(Error::PromptTimeout),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(_)) => return Err(Error::TimerError),
            }
        }
    }
}

/// Debug formatting of raw modem output
struct Printable<'a>(&'a [u8]);

impl core::fmt::Debug for Printable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for byte in self.0 {
            write!(f, "{}", core::ascii::escape_default(*byte))?;
        }

        Ok(())
    }
}
