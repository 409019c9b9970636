//! # Device profile
//!
//! Topics and payloads published by the device: the status topic (also used as last will), the
//! Home-Assistant discovery document and the uptime counter.
//!
//! ````
//! use esp_at_mqtt::device::{DeviceProfile, DEFAULT_BASE_TOPIC, DEFAULT_DISCOVERY_PREFIX, DEFAULT_NAME, DEFAULT_UNIQUE_ID};
//!
//! let device = DeviceProfile::new(DEFAULT_NAME, DEFAULT_UNIQUE_ID, DEFAULT_BASE_TOPIC, DEFAULT_DISCOVERY_PREFIX).unwrap();
//! assert_eq!("home/nodes/sensor/rp2040/status", device.status_topic());
//! assert_eq!("homeassistant/sensor/rp2040/monitor/config", device.discovery_topic());
//! ````
use crate::adapter::Error;
use core::fmt::Write;
use heapless::{String, Vec};
use numtoa::NumToA;
use serde::Serialize;

/// Max. length of a topic
pub const MAX_TOPIC_LEN: usize = 128;

/// Max. length of a generated payload
pub const MAX_PAYLOAD_LEN: usize = 512;

/// Max. digits of a decimal encoded u64
pub const DECIMAL_BUFFER_SIZE: usize = 20;

pub const DEFAULT_NAME: &str = "rp2040";
pub const DEFAULT_UNIQUE_ID: &str = "679ee431-4703-47eb-a0c7-354e8b6f7216";
pub const DEFAULT_BASE_TOPIC: &str = "home/nodes/sensor/rp2040";
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Status payload published once the session is established
pub const ONLINE: &str = "online";

/// Status payload published by the broker as last will
pub const OFFLINE: &str = "offline";

pub type Topic = String<MAX_TOPIC_LEN>;
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

/// Home-Assistant MQTT discovery document of a timestamp sensor
#[derive(Serialize)]
struct DiscoveryDocument<'a> {
    name: &'a str,
    uniq_id: &'a str,
    dev_cla: &'a str,
    #[serde(rename = "~")]
    base_topic: &'a str,
    state_topic: &'a str,
    dev: DeviceDescription<'a>,
}

#[derive(Serialize)]
struct DeviceDescription<'a> {
    identifiers: &'a [&'a str],
    name: &'a str,
}

/// Identity and topics of the device
#[derive(Clone, Debug)]
pub struct DeviceProfile<'a> {
    name: &'a str,
    unique_id: &'a str,
    base_topic: &'a str,
    status_topic: Topic,
    uptime_topic: Topic,
    discovery_topic: Topic,
}

impl<'a> DeviceProfile<'a> {
    /// Derives all topics. Returns [Error::CommandOverflow] if a topic exceeds [MAX_TOPIC_LEN].
    pub fn new(name: &'a str, unique_id: &'a str, base_topic: &'a str, discovery_prefix: &str) -> Result<Self, Error> {
        let mut status_topic = Topic::new();
        write!(status_topic, "{}/status", base_topic).map_err(|_| Error::CommandOverflow)?;

        let mut uptime_topic = Topic::new();
        write!(uptime_topic, "{}/uptime", base_topic).map_err(|_| Error::CommandOverflow)?;

        let mut discovery_topic = Topic::new();
        write!(discovery_topic, "{}/sensor/{}/monitor/config", discovery_prefix, name)
            .map_err(|_| Error::CommandOverflow)?;

        Ok(Self {
            name,
            unique_id,
            base_topic,
            status_topic,
            uptime_topic,
            discovery_topic,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn unique_id(&self) -> &str {
        self.unique_id
    }

    pub fn base_topic(&self) -> &str {
        self.base_topic
    }

    /// Topic of the online/offline status
    pub fn status_topic(&self) -> &str {
        self.status_topic.as_str()
    }

    pub fn uptime_topic(&self) -> &str {
        self.uptime_topic.as_str()
    }

    pub fn discovery_topic(&self) -> &str {
        self.discovery_topic.as_str()
    }

    /// Serializes the discovery document
    pub fn discovery_document(&self) -> Result<Payload, Error> {
        let mut identifier = Topic::new();
        write!(identifier, "{}-{}", self.name, self.unique_id).map_err(|_| Error::CommandOverflow)?;
        let identifiers = [identifier.as_str()];

        let document = DiscoveryDocument {
            name: self.name,
            uniq_id: self.unique_id,
            dev_cla: "timestamp",
            base_topic: self.base_topic,
            state_topic: "~/status",
            dev: DeviceDescription {
                identifiers: &identifiers,
                name: self.name,
            },
        };

        let mut buffer = [0x0; MAX_PAYLOAD_LEN];
        let length = serde_json_core::to_slice(&document, &mut buffer).map_err(|_| Error::CommandOverflow)?;

        Payload::from_slice(&buffer[..length]).map_err(|_| Error::CommandOverflow)
    }
}

/// Encodes the uptime counter as decimal string
pub fn uptime_payload(counter: u32, buffer: &mut [u8; DECIMAL_BUFFER_SIZE]) -> &[u8] {
    counter.numtoa(10, buffer)
}
