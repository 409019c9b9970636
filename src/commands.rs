use crate::adapter::Error;
use crate::device::MAX_TOPIC_LEN;
use atat::atat_derive::{AtatCmd, AtatResp};
use atat::heapless::String;

/// Capacity of an encoded command line including the trailing CRLF
pub(crate) const COMMAND_BUFFER_SIZE: usize = 512;

/// Success token of most commands
pub(crate) const OK: &[u8] = b"OK";

/// MQTT link id, ESP-AT currently just supports a single one
const LINK_ID: u8 = 0;

/// Max. length of client id, username and password
const MAX_CREDENTIAL_LEN: usize = 64;

/// Max. length of the broker host name
const MAX_HOST_LEN: usize = 64;

/// Max. length of the last will payload
const MAX_LWT_PAYLOAD_LEN: usize = 64;

/// Token which signals success once contained in the response of a command
pub(crate) trait ExpectedResponse {
    const EXPECTED: &'static [u8];
}

/// Responses are scanned by the adapter, so the typed response is always empty
#[derive(Clone, AtatResp)]
pub(crate) struct NoResponse;

/// Connection scheme of the MQTT client
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionScheme {
    /// MQTT over TCP
    #[default]
    Tcp = 1,
    /// MQTT over TLS, no certificate verification
    Tls = 2,
    /// MQTT over TLS, verifies the server certificate
    TlsVerifyServer = 3,
    /// MQTT over TLS, provides a client certificate
    TlsClientCertificate = 4,
    /// MQTT over TLS, verifies the server certificate and provides a client certificate
    TlsMutual = 5,
    /// MQTT over WebSocket (TCP)
    WebSocket = 6,
    /// MQTT over WebSocket Secure, no certificate verification
    WebSocketTls = 7,
    /// MQTT over WebSocket Secure, verifies the server certificate
    WebSocketTlsVerifyServer = 8,
    /// MQTT over WebSocket Secure, provides a client certificate
    WebSocketTlsClientCertificate = 9,
    /// MQTT over WebSocket Secure, verifies the server certificate and provides a client certificate
    WebSocketTlsMutual = 10,
}

/// Queries the access point the station is associated with
#[derive(Clone, AtatCmd)]
#[at_cmd("+CWJAP?", NoResponse)]
pub(crate) struct WifiStatusCommand;

impl ExpectedResponse for WifiStatusCommand {
    const EXPECTED: &'static [u8] = b"+CWJAP:";
}

/// Sets the MQTT user properties. Username, password and certificate path are left empty.
#[derive(Clone, AtatCmd)]
#[at_cmd("+MQTTUSERCFG", NoResponse)]
pub(crate) struct UserConfigCommand {
    link_id: u8,

    /// Connection scheme, see [ConnectionScheme]
    scheme: u8,

    client_id: String<MAX_CREDENTIAL_LEN>,
    username: String<MAX_CREDENTIAL_LEN>,
    password: String<MAX_CREDENTIAL_LEN>,

    /// Index of the client certificate
    cert_key_id: u8,

    /// Index of the CA certificate
    ca_id: u8,

    /// Resource path, only used by WebSocket schemes
    path: String<MAX_CREDENTIAL_LEN>,
}

impl UserConfigCommand {
    pub fn new(scheme: ConnectionScheme, client_id: &str) -> Result<Self, Error> {
        Ok(Self {
            link_id: LINK_ID,
            scheme: scheme as u8,
            client_id: parameter(client_id)?,
            username: String::new(),
            password: String::new(),
            cert_key_id: 0,
            ca_id: 0,
            path: String::new(),
        })
    }
}

impl ExpectedResponse for UserConfigCommand {
    const EXPECTED: &'static [u8] = OK;
}

/// Sets the connection properties, most notably the last will message
#[derive(Clone, AtatCmd)]
#[at_cmd("+MQTTCONNCFG", NoResponse)]
pub(crate) struct ConnectionConfigCommand {
    link_id: u8,

    /// 0 => modem default
    keepalive: u8,

    /// 0 => clean session
    disable_clean_session: u8,

    lwt_topic: String<MAX_TOPIC_LEN>,
    lwt_payload: String<MAX_LWT_PAYLOAD_LEN>,
    lwt_qos: u8,
    lwt_retain: u8,
}

impl ConnectionConfigCommand {
    pub fn new(lwt_topic: &str, lwt_payload: &str) -> Result<Self, Error> {
        Ok(Self {
            link_id: LINK_ID,
            keepalive: 0,
            disable_clean_session: 0,
            lwt_topic: parameter(lwt_topic)?,
            lwt_payload: parameter(lwt_payload)?,
            lwt_qos: 0,
            lwt_retain: 0,
        })
    }
}

impl ExpectedResponse for ConnectionConfigCommand {
    const EXPECTED: &'static [u8] = OK;
}

/// Connects to the MQTT broker without automatic reconnect
#[derive(Clone, AtatCmd)]
#[at_cmd("+MQTTCONN", NoResponse)]
pub(crate) struct BrokerConnectCommand {
    link_id: u8,
    host: String<MAX_HOST_LEN>,
    port: u16,

    /// 0 => no automatic reconnect
    reconnect: u8,
}

impl BrokerConnectCommand {
    pub fn new(host: &str, port: u16) -> Result<Self, Error> {
        Ok(Self {
            link_id: LINK_ID,
            host: parameter(host)?,
            port,
            reconnect: 0,
        })
    }
}

impl ExpectedResponse for BrokerConnectCommand {
    const EXPECTED: &'static [u8] = OK;
}

/// Closes the MQTT connection and releases all resources
#[derive(Clone, AtatCmd)]
#[at_cmd("+MQTTCLEAN", NoResponse)]
pub(crate) struct CleanCommand {
    link_id: u8,
}

impl CleanCommand {
    pub fn new() -> Self {
        Self { link_id: LINK_ID }
    }
}

impl ExpectedResponse for CleanCommand {
    const EXPECTED: &'static [u8] = OK;
}

/// Announces a raw publish of the given length. Modem responds with the '>' prompt.
#[derive(Clone, AtatCmd)]
#[at_cmd("+MQTTPUBRAW", NoResponse)]
pub(crate) struct PublishRawCommand {
    link_id: u8,
    topic: String<MAX_TOPIC_LEN>,
    length: usize,
    qos: u8,
    retain: u8,
}

impl PublishRawCommand {
    pub fn new(topic: &str, length: usize) -> Result<Self, Error> {
        Ok(Self {
            link_id: LINK_ID,
            topic: parameter(topic)?,
            length,
            qos: 0,
            retain: 0,
        })
    }
}

impl ExpectedResponse for PublishRawCommand {
    /// Checked after the payload has been streamed
    const EXPECTED: &'static [u8] = OK;
}

// Encoding may not exceed the command buffer
const _: () = assert!(<WifiStatusCommand as atat::AtatCmd>::MAX_LEN <= COMMAND_BUFFER_SIZE);
const _: () = assert!(<UserConfigCommand as atat::AtatCmd>::MAX_LEN <= COMMAND_BUFFER_SIZE);
const _: () = assert!(<ConnectionConfigCommand as atat::AtatCmd>::MAX_LEN <= COMMAND_BUFFER_SIZE);
const _: () = assert!(<BrokerConnectCommand as atat::AtatCmd>::MAX_LEN <= COMMAND_BUFFER_SIZE);
const _: () = assert!(<CleanCommand as atat::AtatCmd>::MAX_LEN <= COMMAND_BUFFER_SIZE);
const _: () = assert!(<PublishRawCommand as atat::AtatCmd>::MAX_LEN <= COMMAND_BUFFER_SIZE);

/// Copies a string parameter. Fails with [Error::CommandOverflow] if it exceeds the field capacity.
fn parameter<const N: usize>(value: &str) -> Result<String<N>, Error> {
    String::try_from(value).map_err(|_| Error::CommandOverflow)
}
