use crate::adapter::{Adapter, Error};
use crate::commands::ConnectionScheme;
use crate::config::Config;
use crate::tests::mock::{
    Event, MockTimer, MockTransport, ERROR_RESPONSE, WIFI_ASSOCIATED, WIFI_NOT_ASSOCIATED,
};
use embedded_io::ErrorKind;
use std::string::ToString;
use std::sync::{Arc, Mutex};
use std::vec;

type AdapterType = Adapter<MockTransport, MockTimer, 1_000_000>;

fn adapter(transport: MockTransport) -> AdapterType {
    Adapter::new(transport, MockTimer::expiring())
}

#[test]
fn test_check_wifi_association_connected() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+CWJAP?\r\n", WIFI_ASSOCIATED);

    let mut adapter = adapter(transport);
    adapter.check_wifi_association().unwrap();

    assert_eq!("AT+CWJAP?\r\n".to_string(), adapter.transport.written_string());
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_check_wifi_association_spec_response() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+CWJAP?\r\n", b"+CWJAP:1,\"ssid\"...\r\nOK\r\n");

    let mut adapter = adapter(transport);
    assert_eq!(Ok(()), adapter.check_wifi_association());
}

#[test]
fn test_check_wifi_association_no_ap() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+CWJAP?\r\n", WIFI_NOT_ASSOCIATED);

    let mut adapter = adapter(transport);
    assert_eq!(Error::UnexpectedResponse, adapter.check_wifi_association().unwrap_err());
}

#[test]
fn test_check_wifi_association_no_response() {
    let mut adapter = adapter(MockTransport::new());
    assert_eq!(Error::Timeout, adapter.check_wifi_association().unwrap_err());
}

#[test]
fn test_check_wifi_association_idempotent() {
    let mut transport = MockTransport::new();
    for _ in 0..3 {
        transport.add_response(b"AT+CWJAP?\r\n", WIFI_ASSOCIATED);
    }

    let mut adapter = adapter(transport);
    for _ in 0..3 {
        adapter.check_wifi_association().unwrap();
        assert_eq!(0, adapter.transport.unread_count());
    }

    assert_eq!("AT+CWJAP?\r\n".repeat(3), adapter.transport.written_string());
}

#[test]
fn test_response_timeout_used_for_scan() {
    let durations = Arc::new(Mutex::new(vec![]));
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+CWJAP?\r\n", WIFI_ASSOCIATED);

    let mut adapter: AdapterType = Adapter::new(transport, MockTimer::recording(durations.clone()));
    adapter.check_wifi_association().unwrap();

    assert_eq!(vec![MockTimer::duration_ms(100)], *durations.lock().unwrap());
}

#[test]
fn test_configured_timeouts() {
    let durations = Arc::new(Mutex::new(vec![]));
    let mut transport = MockTransport::new();
    transport.add_publish(b"AT+MQTTPUBRAW=0,\"t\",1,0,0\r\n", b"x");

    let config = Config::default().response_timeout_ms(250).prompt_timeout_ms(1_000);
    let mut adapter: AdapterType = Adapter::with_config(transport, MockTimer::recording(durations.clone()), &config);
    adapter.mqtt_publish("t", b"x").unwrap();

    assert_eq!(
        vec![MockTimer::duration_ms(1_000), MockTimer::duration_ms(250)],
        *durations.lock().unwrap()
    );
}

#[test]
fn test_mqtt_configure_user_command() {
    let mut transport = MockTransport::new();
    transport.add_ok_response(b"AT+MQTTUSERCFG=0,1,\"rp2040\",\"\",\"\",0,0,\"\"\r\n");

    let mut adapter = adapter(transport);
    adapter.mqtt_configure_user(ConnectionScheme::Tcp, "rp2040").unwrap();
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_mqtt_configure_user_scheme() {
    let mut transport = MockTransport::new();
    transport.add_ok_response(b"AT+MQTTUSERCFG=0,10,\"client\",\"\",\"\",0,0,\"\"\r\n");

    let mut adapter = adapter(transport);
    adapter
        .mqtt_configure_user(ConnectionScheme::WebSocketTlsMutual, "client")
        .unwrap();
}

#[test]
fn test_mqtt_configure_user_client_id_overflow() {
    let client_id = "c".repeat(65);
    let mut adapter = adapter(MockTransport::new());

    assert_eq!(
        Error::CommandOverflow,
        adapter.mqtt_configure_user(ConnectionScheme::Tcp, &client_id).unwrap_err()
    );
    assert!(adapter.transport.events().is_empty());
}

#[test]
fn test_mqtt_configure_connection_command() {
    let mut transport = MockTransport::new();
    transport.add_ok_response(b"AT+MQTTCONNCFG=0,0,0,\"home/nodes/sensor/rp2040/status\",\"offline\",0,0\r\n");

    let mut adapter = adapter(transport);
    adapter
        .mqtt_configure_connection("home/nodes/sensor/rp2040/status", "offline")
        .unwrap();
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_mqtt_connect_command() {
    let mut transport = MockTransport::new();
    transport.add_ok_response(b"AT+MQTTCONN=0,\"10.0.0.167\",1883,0\r\n");

    let mut adapter = adapter(transport);
    adapter.mqtt_connect("10.0.0.167", 1883).unwrap();
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_mqtt_connect_error() {
    let mut transport = MockTransport::new();
    transport.add_error_response(b"AT+MQTTCONN=0,\"10.0.0.167\",1883,0\r\n");

    let mut adapter = adapter(transport);
    assert_eq!(Error::ErrorResponse, adapter.mqtt_connect("10.0.0.167", 1883).unwrap_err());
}

#[test]
fn test_mqtt_clean_command() {
    let mut transport = MockTransport::new();
    transport.add_ok_response(b"AT+MQTTCLEAN=0\r\n");

    let mut adapter = adapter(transport);
    adapter.mqtt_clean().unwrap();
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_command_overflow_nothing_written() {
    let topic = "t".repeat(300);
    let mut adapter = adapter(MockTransport::new());

    assert_eq!(
        Error::CommandOverflow,
        adapter.mqtt_configure_connection(&topic, "offline").unwrap_err()
    );
    assert_eq!(Error::CommandOverflow, adapter.mqtt_publish(&topic, b"x").unwrap_err());
    assert!(adapter.transport.events().is_empty());
}

#[test]
fn test_mqtt_publish_byte_sequence() {
    let mut transport = MockTransport::new();
    transport.add_publish(b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n", b"online");

    let mut adapter = adapter(transport);
    adapter.mqtt_publish("status", b"online").unwrap();

    assert_eq!(
        "AT+MQTTPUBRAW=0,\"status\",6,0,0\r\nonline".to_string(),
        adapter.transport.written_string()
    );
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_mqtt_publish_payload_not_sent_before_prompt() {
    let mut transport = MockTransport::new();
    transport.add_publish(b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n", b"online");

    let mut adapter = adapter(transport);
    adapter.mqtt_publish("status", b"online").unwrap();

    let events = adapter.transport.events();
    let prompt = events.iter().position(|event| *event == Event::Read(b'>')).unwrap();
    let payload = events
        .iter()
        .position(|event| *event == Event::Write(b"online".to_vec()))
        .unwrap();

    assert!(prompt < payload);
}

#[test]
fn test_mqtt_publish_prompt_timeout() {
    let mut transport = MockTransport::new();
    transport.add_ok_response(b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n");

    let mut adapter = adapter(transport);
    assert_eq!(Error::PromptTimeout, adapter.mqtt_publish("status", b"online").unwrap_err());

    // Payload must never be written without the prompt
    assert_eq!(
        "AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n".to_string(),
        adapter.transport.written_string()
    );
}

#[test]
fn test_mqtt_publish_prompt_after_delay() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n", b"\r\nOK\r\n");

    let mut timer = MockTimer::new();
    timer.expect_start().returning(|_| Ok(()));
    timer
        .expect_wait()
        .times(2)
        .returning(|| nb::Result::Err(nb::Error::WouldBlock));
    timer.expect_wait().returning(|| nb::Result::Ok(()));

    let mut adapter: AdapterType = Adapter::new(transport, timer);
    assert_eq!(Error::PromptTimeout, adapter.mqtt_publish("status", b"online").unwrap_err());
}

#[test]
fn test_mqtt_publish_failed_confirmation() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n", b"\r\nOK\r\n\r\n>");
    transport.add_response(b"online", b"\r\n+MQTTPUB:FAIL\r\n");

    let mut adapter = adapter(transport);
    assert_eq!(Error::ErrorResponse, adapter.mqtt_publish("status", b"online").unwrap_err());
}

#[test]
fn test_all_commands_fail_on_error_response() {
    let mut transport = MockTransport::new();
    transport.respond_to_all(b"ERROR\r\n");

    let mut adapter = adapter(transport);
    assert_eq!(Error::ErrorResponse, adapter.check_wifi_association().unwrap_err());
    assert_eq!(
        Error::ErrorResponse,
        adapter.mqtt_configure_user(ConnectionScheme::Tcp, "rp2040").unwrap_err()
    );
    assert_eq!(
        Error::ErrorResponse,
        adapter.mqtt_configure_connection("status", "offline").unwrap_err()
    );
    assert_eq!(Error::ErrorResponse, adapter.mqtt_connect("10.0.0.167", 1883).unwrap_err());
    assert_eq!(Error::ErrorResponse, adapter.mqtt_clean().unwrap_err());
    assert_eq!(Error::ErrorResponse, adapter.mqtt_publish("status", b"online").unwrap_err());
}

#[test]
fn test_mqtt_publish_rejected_without_waiting_for_prompt() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n", ERROR_RESPONSE);

    // Prompt timeout never elapses
    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer.expect_wait().never();

    let mut adapter: AdapterType = Adapter::new(transport, timer);
    assert_eq!(Error::ErrorResponse, adapter.mqtt_publish("status", b"online").unwrap_err());
    assert_eq!(
        "AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n".to_string(),
        adapter.transport.written_string()
    );
}

#[test]
fn test_mqtt_publish_unrelated_lines_before_prompt() {
    let mut transport = MockTransport::new();
    transport.add_response(
        b"AT+MQTTPUBRAW=0,\"status\",6,0,0\r\n",
        b"\r\n+MQTTCONNECTED:0,1,\"10.0.0.167\",\"1883\",\"\",1\r\nOK\r\n\r\n>",
    );
    transport.add_response(b"online", b"\r\n+MQTTPUB:OK\r\n");

    let mut adapter = adapter(transport);
    adapter.mqtt_publish("status", b"online").unwrap();
    adapter.transport.assert_all_exchanges_done();
}

#[test]
fn test_wait_for_pattern() {
    let mut adapter = adapter(MockTransport::new());

    adapter.transport.push_rx(b"\r\nready\r\n");
    adapter.wait_for(b"ready").unwrap();

    adapter.transport.push_rx(ERROR_RESPONSE);
    assert_eq!(Error::ErrorResponse, adapter.wait_for(b"ready").unwrap_err());
}

#[test]
fn test_transport_write_error() {
    let mut transport = MockTransport::new();
    transport.fail(ErrorKind::BrokenPipe);

    let mut adapter = adapter(transport);
    assert_eq!(
        Error::TransportError(ErrorKind::BrokenPipe),
        adapter.check_wifi_association().unwrap_err()
    );
}

#[test]
fn test_timer_start_error() {
    let mut transport = MockTransport::new();
    transport.add_response(b"AT+CWJAP?\r\n", WIFI_ASSOCIATED);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Err(31));

    let mut adapter: AdapterType = Adapter::new(transport, timer);
    assert_eq!(Error::TimerError, adapter.check_wifi_association().unwrap_err());
}
