//! # Bridge loop
//!
//! Cooperative main loop of the device. Each [Bridge::poll] call
//! * publishes the uptime counter once the report interval elapsed,
//! * forwards one byte from the console to the modem (CR gets followed by LF),
//! * forwards one byte from the modem to the console.
//!
//! Only the publish may block, bounded by the response and prompt timeouts of the [Adapter].
use crate::adapter::Adapter;
use crate::config::Config;
use crate::device::{uptime_payload, DeviceProfile, DECIMAL_BUFFER_SIZE};
use crate::gate::{CancellationToken, ConnectivityGate};
use crate::session::{Session, SessionError};
use crate::transport::Transport;
use embedded_io::ErrorKind;
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use log::info;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeError {
    /// Establishing or using the MQTT session failed
    Session(SessionError),

    /// Console channel failed
    Console(ErrorKind),

    /// Modem channel failed while forwarding
    Modem(ErrorKind),
}

impl From<SessionError> for BridgeError {
    fn from(error: SessionError) -> Self {
        Self::Session(error)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BridgeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            BridgeError::Session(e) => defmt::write!(f, "BridgeError::Session({})", e),
            BridgeError::Console(e) => defmt::write!(f, "BridgeError::Console({})", defmt::Debug2Format(e)),
            BridgeError::Modem(e) => defmt::write!(f, "BridgeError::Modem({})", defmt::Debug2Format(e)),
        }
    }
}

/// Forwards a single pending console byte to the modem. A CR is followed by an injected LF.
///
/// Returns the forwarded byte, None if no byte was pending.
pub fn forward_console<C: Transport, P: Transport>(console: &mut C, modem: &mut P) -> Result<Option<u8>, BridgeError> {
    if !console.byte_available().map_err(BridgeError::Console)? {
        return Ok(None);
    }

    let byte = console.read_byte().map_err(BridgeError::Console)?;
    modem.write_all(&[byte]).map_err(BridgeError::Modem)?;

    if byte == CR {
        modem.write_all(&[LF]).map_err(BridgeError::Modem)?;
    }

    Ok(Some(byte))
}

/// Forwards a single pending modem byte verbatim to the console
pub fn forward_modem<P: Transport, C: Transport>(modem: &mut P, console: &mut C) -> Result<Option<u8>, BridgeError> {
    if !modem.byte_available().map_err(BridgeError::Modem)? {
        return Ok(None);
    }

    let byte = modem.read_byte().map_err(BridgeError::Modem)?;
    console.write_all(&[byte]).map_err(BridgeError::Console)?;

    Ok(Some(byte))
}

pub struct Bridge<'a, P: Transport, C: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32> {
    adapter: Adapter<P, T, TIMER_HZ>,
    console: C,
    session: Session<'a>,
    device: &'a DeviceProfile<'a>,
    gate: ConnectivityGate<TIMER_HZ>,

    /// Interval of the uptime publish
    report_interval: TimerDurationU32<TIMER_HZ>,

    /// Due time of the next uptime publish. None => due immediately
    next_report: Option<TimerInstantU32<TIMER_HZ>>,

    /// Published uptime counter, incremented once per report interval
    uptime: u32,
}

impl<'a, P: Transport, C: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32> Bridge<'a, P, C, T, TIMER_HZ> {
    pub fn new(
        adapter: Adapter<P, T, TIMER_HZ>,
        console: C,
        session: Session<'a>,
        device: &'a DeviceProfile<'a>,
        config: &Config,
    ) -> Self {
        Self {
            adapter,
            console,
            session,
            device,
            gate: ConnectivityGate::new(config),
            report_interval: TimerDurationU32::millis(config.report_interval_ms),
            next_report: None,
            uptime: 0,
        }
    }

    /// Waits for WIFI, establishes the MQTT session and announces the device
    pub fn start(&mut self, cancel: &CancellationToken) -> Result<(), BridgeError> {
        self.session.establish(&mut self.adapter, &self.gate, cancel)?;
        self.session.announce(&mut self.adapter, self.device)?;

        info!("Device {} online", self.device.name());
        Ok(())
    }

    /// Single iteration of the main loop
    pub fn poll(&mut self) -> Result<(), BridgeError> {
        let now = self.adapter.now();
        if self.next_report.map_or(true, |due| now >= due) {
            self.report_uptime()?;
            self.next_report = Some(self.adapter.now() + self.report_interval);
        }

        forward_console(&mut self.console, self.adapter.transport_mut())?;
        forward_modem(self.adapter.transport_mut(), &mut self.console)?;
        Ok(())
    }

    /// Starts the device and runs the main loop until cancelled
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<(), BridgeError> {
        self.start(cancel)?;

        while !cancel.is_cancelled() {
            self.poll()?;
        }

        Ok(())
    }

    pub fn session(&self) -> &Session<'a> {
        &self.session
    }

    pub fn uptime(&self) -> u32 {
        self.uptime
    }

    pub fn adapter_mut(&mut self) -> &mut Adapter<P, T, TIMER_HZ> {
        &mut self.adapter
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Publishes the current counter. Failed publishes are logged and skipped, the counter advances anyway.
    fn report_uptime(&mut self) -> Result<(), BridgeError> {
        let mut digits = [0x0; DECIMAL_BUFFER_SIZE];
        let payload = uptime_payload(self.uptime, &mut digits);

        match self.session.publish(&mut self.adapter, self.device.uptime_topic(), payload) {
            Ok(_) | Err(SessionError::PublishFailed(_)) => {}
            Err(error) => return Err(error.into()),
        }

        self.uptime = self.uptime.wrapping_add(1);
        Ok(())
    }
}
