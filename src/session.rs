//! # MQTT session
//!
//! State machine sequencing the WIFI gate, the MQTT configuration and the broker connect on top of the
//! [Adapter].
//!
//! ````text
//! Disconnected -> WaitingForWifi -> ConfiguringUser -> ConfiguringConnection -> Connecting -> Connected -> Publishing
//! ````
//!
//! How failed steps are handled is defined by the [StepPolicy]. In [StepPolicy::Strict] mode a step is
//! retried up to `step_attempts` times, afterwards the session falls back to [SessionState::Disconnected]
//! and the error is returned. In [StepPolicy::BestEffort] mode the failure is logged and the session
//! advances anyway.
use crate::adapter::{Adapter, Error};
use crate::commands::ConnectionScheme;
use crate::device::{DeviceProfile, OFFLINE, ONLINE};
use crate::gate::{CancellationToken, ConnectivityGate, GateError};
use crate::transport::Transport;
use fugit_timer::Timer;
use log::{error, info, warn};

/// Default number of attempts per step in strict mode
pub const DEFAULT_STEP_ATTEMPTS: u8 = 3;

/// Default MQTT broker port
pub const DEFAULT_BROKER_PORT: u16 = 1883;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    WaitingForWifi,
    ConfiguringUser,
    ConfiguringConnection,
    Connecting,
    Connected,
    Publishing,
}

/// Reaction on a failed configuration or connect step
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StepPolicy {
    /// Retry the step, abort the session once the attempts are used up
    #[default]
    Strict,

    /// Log the failure and continue with the next step
    BestEffort,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionError {
    /// Step failed in strict mode after all attempts
    StepFailed { state: SessionState, error: Error },

    /// Connectivity gate failed or was cancelled
    Gate(GateError),

    /// Publishing requires an established session
    NotConnected,

    /// Publish failed
    PublishFailed(Error),

    /// Teardown command failed. Session is disconnected anyway.
    TeardownFailed(Error),
}

impl From<GateError> for SessionError {
    fn from(error: GateError) -> Self {
        Self::Gate(error)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SessionError::StepFailed { state, error } => {
                defmt::write!(
                    f,
                    "SessionError::StepFailed({}, {})",
                    defmt::Debug2Format(state),
                    error
                )
            }
            SessionError::Gate(e) => defmt::write!(f, "SessionError::Gate({})", e),
            SessionError::NotConnected => defmt::write!(f, "SessionError::NotConnected"),
            SessionError::PublishFailed(e) => defmt::write!(f, "SessionError::PublishFailed({})", e),
            SessionError::TeardownFailed(e) => defmt::write!(f, "SessionError::TeardownFailed({})", e),
        }
    }
}

/// Broker and client parameters of a session
#[derive(Copy, Clone, Debug)]
pub struct SessionConfig<'a> {
    pub scheme: ConnectionScheme,
    pub client_id: &'a str,
    pub lwt_topic: &'a str,
    pub lwt_payload: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub policy: StepPolicy,

    /// Attempts per step in strict mode. Values below one are treated as one.
    pub step_attempts: u8,
}

impl<'a> SessionConfig<'a> {
    /// Session of the given device. The status topic is used as last will with [OFFLINE] payload.
    pub fn for_device(device: &'a DeviceProfile<'_>, host: &'a str, port: u16) -> Self {
        Self {
            scheme: ConnectionScheme::Tcp,
            client_id: device.name(),
            lwt_topic: device.status_topic(),
            lwt_payload: OFFLINE,
            host,
            port,
            policy: StepPolicy::Strict,
            step_attempts: DEFAULT_STEP_ATTEMPTS,
        }
    }

    pub fn policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn step_attempts(mut self, attempts: u8) -> Self {
        self.step_attempts = attempts;
        self
    }
}

/// Outcome of a failed step attempt which did not abort the session
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FailureAction {
    /// Attempt the same step again
    Retry,

    /// Continue with the next step
    Skip,
}

pub struct Session<'a> {
    config: SessionConfig<'a>,
    state: SessionState,

    /// Failed attempts of the current step
    failed_attempts: u8,
}

impl<'a> Session<'a> {
    pub fn new(config: SessionConfig<'a>) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected | SessionState::Publishing)
    }

    /// Performs a single transition attempt and returns the resulting state
    ///
    /// A failed WIFI check keeps the session waiting and is returned as error. A failed MQTT step is
    /// handled according to the [StepPolicy], an error is just returned once the session was aborted.
    pub fn step<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
    ) -> Result<SessionState, SessionError> {
        let result = match self.state {
            SessionState::Disconnected => {
                self.transition(SessionState::WaitingForWifi);
                return Ok(self.state);
            }
            SessionState::WaitingForWifi => {
                if let Err(error) = adapter.check_wifi_association() {
                    return Err(SessionError::StepFailed {
                        state: self.state,
                        error,
                    });
                }

                Ok(())
            }
            SessionState::ConfiguringUser => adapter.mqtt_configure_user(self.config.scheme, self.config.client_id),
            SessionState::ConfiguringConnection => {
                adapter.mqtt_configure_connection(self.config.lwt_topic, self.config.lwt_payload)
            }
            SessionState::Connecting => adapter.mqtt_connect(self.config.host, self.config.port),
            SessionState::Connected | SessionState::Publishing => return Ok(self.state),
        };

        match result {
            Ok(_) => self.advance(),
            Err(error) => {
                if self.handle_failure(error)? == FailureAction::Skip {
                    self.advance();
                }
            }
        }

        Ok(self.state)
    }

    /// Drives the session until connected. The WIFI step is delegated to the gate.
    ///
    /// Failed steps are retried after the initial poll interval of the gate.
    pub fn establish<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        gate: &ConnectivityGate<TIMER_HZ>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Gate(GateError::Cancelled));
            }

            match self.state {
                SessionState::Connected | SessionState::Publishing => return Ok(()),
                SessionState::WaitingForWifi => {
                    gate.wait(adapter, cancel)?;
                    self.advance();
                }
                _ => {
                    let failures = self.failed_attempts;
                    self.step(adapter)?;

                    if self.failed_attempts > failures {
                        gate.pause(adapter, cancel)?;
                    }
                }
            }
        }
    }

    /// Publishes the online status and the discovery document, then switches to publishing
    ///
    /// Each publish is a step of its own and handled according to the [StepPolicy].
    pub fn announce<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        device: &DeviceProfile<'_>,
    ) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        self.announce_step(adapter, device.status_topic(), ONLINE.as_bytes())?;

        let document = device.discovery_document().map_err(SessionError::PublishFailed)?;
        self.announce_step(adapter, device.discovery_topic(), &document)?;

        self.transition(SessionState::Publishing);
        Ok(())
    }

    /// Publishes a message on an established session
    pub fn publish<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        adapter.mqtt_publish(topic, payload).map_err(|error| {
            warn!("Publishing to {} failed: {:?}", topic, error);
            SessionError::PublishFailed(error)
        })
    }

    /// Closes the MQTT connection. The session is disconnected in any case.
    pub fn teardown<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
    ) -> Result<(), SessionError> {
        let result = adapter.mqtt_clean();
        self.transition(SessionState::Disconnected);

        result.map_err(SessionError::TeardownFailed)
    }

    /// Single publish of the announcement, retried according to the step policy
    fn announce_step<P: Transport, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        adapter: &mut Adapter<P, T, TIMER_HZ>,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        loop {
            let error = match adapter.mqtt_publish(topic, payload) {
                Ok(_) => break,
                Err(error) => error,
            };

            if self.handle_failure(error)? == FailureAction::Skip {
                break;
            }
        }

        self.failed_attempts = 0;
        Ok(())
    }

    /// Applies the step policy to a failed attempt of the current step
    fn handle_failure(&mut self, error: Error) -> Result<FailureAction, SessionError> {
        match self.config.policy {
            StepPolicy::BestEffort => {
                warn!("{:?} failed ({:?}), continuing", self.state, error);
                Ok(FailureAction::Skip)
            }
            StepPolicy::Strict => {
                self.failed_attempts += 1;

                if self.failed_attempts < self.config.step_attempts.max(1) {
                    warn!(
                        "{:?} failed ({:?}), attempt {}/{}",
                        self.state, error, self.failed_attempts, self.config.step_attempts
                    );
                    return Ok(FailureAction::Retry);
                }

                error!("{:?} failed ({:?}), aborting session", self.state, error);
                let state = self.state;
                self.transition(SessionState::Disconnected);
                Err(SessionError::StepFailed { state, error })
            }
        }
    }

    /// Moves on to the next state of the connect sequence
    fn advance(&mut self) {
        let next = match self.state {
            SessionState::Disconnected => SessionState::WaitingForWifi,
            SessionState::WaitingForWifi => SessionState::ConfiguringUser,
            SessionState::ConfiguringUser => SessionState::ConfiguringConnection,
            SessionState::ConfiguringConnection => SessionState::Connecting,
            SessionState::Connecting => SessionState::Connected,
            SessionState::Connected | SessionState::Publishing => SessionState::Publishing,
        };

        self.transition(next);
    }

    fn transition(&mut self, next: SessionState) {
        if next != self.state {
            info!("MQTT session: {:?} -> {:?}", self.state, next);
        }

        self.state = next;
        self.failed_attempts = 0;
    }
}
