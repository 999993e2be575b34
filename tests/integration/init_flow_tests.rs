//! Connection initialization through the engine.

use bandlink::DeviceEngine;
use bandlink::app::events::DeviceEvent;
use bandlink::config::EngineConfig;
use bandlink::connection::InitPhase;
use bandlink::error::{Error, SequenceError};
use bandlink::init::ZEPP_AUTH_ENDPOINT;
use bandlink::services::{battery, connection, discovery, file_transfer, heart_rate};

use crate::mock_device::*;

fn phases(sink: &RecordingSink) -> Vec<InitPhase> {
    sink.events
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::PhaseChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

#[test]
fn handshake_then_discovery_reaches_services_initialized() {
    let mut sink = RecordingSink::new();
    let mut engine = DeviceEngine::zepp(
        EngineConfig::default(),
        MockTransport::new(23),
        Box::new(ScriptedAuth { key: [7; 16] }),
    )
    .unwrap();
    engine.set_cipher(Box::new(XorCipher));

    engine.connect(at(0), &mut sink).unwrap();
    assert_eq!(engine.phase(), InitPhase::Auth);
    assert_eq!(payloads_to(&zepp_written(&engine), ZEPP_AUTH_ENDPOINT), vec![vec![0x01]]);

    zepp_notify(&mut engine, at(50), ZEPP_AUTH_ENDPOINT, &[0x10, 0x01], &mut sink);
    assert_eq!(engine.phase(), InitPhase::Phase3);

    zepp_notify(
        &mut engine,
        at(100),
        discovery::ENDPOINT,
        &discovery::encode_response(&[
            service(connection::ENDPOINT, false),
            service(battery::ENDPOINT, false),
            service(file_transfer::ENDPOINT, true),
        ]),
        &mut sink,
    );
    assert_eq!(engine.phase(), InitPhase::ServicesInitialized);
    assert_eq!(
        phases(&sink),
        vec![
            InitPhase::Auth,
            InitPhase::Phase2,
            InitPhase::Phase3,
            InitPhase::ServicesInitialized
        ]
    );

    let endpoints: Vec<u16> = zepp_written(&engine).iter().map(|f| f.endpoint).collect();
    assert_eq!(
        endpoints,
        vec![
            ZEPP_AUTH_ENDPOINT,
            connection::ENDPOINT,
            battery::ENDPOINT,
            discovery::ENDPOINT,
            file_transfer::ENDPOINT,
        ]
    );
    assert!(sink.errors.is_empty());
}

#[test]
fn rejected_handshake_stays_in_auth() {
    let mut sink = RecordingSink::new();
    let mut engine = DeviceEngine::zepp(
        EngineConfig::default(),
        MockTransport::new(23),
        Box::new(ScriptedAuth { key: [7; 16] }),
    )
    .unwrap();
    engine.connect(at(0), &mut sink).unwrap();
    zepp_notify(&mut engine, at(10), ZEPP_AUTH_ENDPOINT, &[0x10, 0x04], &mut sink);

    assert_eq!(engine.phase(), InitPhase::Auth);
    assert_eq!(sink.errors, vec![Error::from(SequenceError::AuthFailed)]);
    assert_eq!(zepp_written(&engine).len(), 1);
}

#[test]
fn requests_refused_while_discovery_in_flight() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_connected(&mut sink);
    let before = engine.transport().written.len();

    let result = engine.send(heart_rate::ENDPOINT, vec![0x04, 0x01], None, &mut sink);
    assert_eq!(
        result,
        Err(SequenceError::RequestDuringDiscovery {
            endpoint: heart_rate::ENDPOINT
        }
        .into())
    );
    assert_eq!(engine.transport().written.len(), before);
    assert_eq!(engine.phase(), InitPhase::Phase3);
}

#[test]
fn handler_initialization_sees_services_initialized() {
    let mut sink = RecordingSink::new();
    let engine = zepp_ready(&mut sink, &[service(file_transfer::ENDPOINT, false)]);
    // The capabilities request is issued during handler initialization and
    // must not be refused by the discovery gate.
    assert_eq!(
        payloads_to(&zepp_written(&engine), file_transfer::ENDPOINT),
        vec![vec![0x01]]
    );
    assert!(sink.errors.is_empty());
}

#[test]
fn unsupported_handlers_stay_silent() {
    let mut sink = RecordingSink::new();
    let engine = zepp_ready(&mut sink, &[service(battery::ENDPOINT, false)]);
    assert!(payloads_to(&zepp_written(&engine), file_transfer::ENDPOINT).is_empty());
    assert!(!engine.state().is_supported(file_transfer::ENDPOINT));
}

#[test]
fn disconnect_then_reconnect_starts_over() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(battery::ENDPOINT, false)]);
    engine.disconnect(&mut sink);
    assert_eq!(engine.phase(), InitPhase::NotStarted);
    assert!(!engine.is_connected());
    assert!(engine.state().supported_endpoints().is_empty());
    assert_eq!(
        engine.send(battery::ENDPOINT, vec![0x03], None, &mut sink),
        Err(SequenceError::NotConnected.into())
    );

    sink.events.clear();
    engine.connect(at(10_000), &mut sink).unwrap();
    assert_eq!(engine.phase(), InitPhase::Phase3);
    assert_eq!(phases(&sink).first(), Some(&InitPhase::Auth));
}

#[test]
fn notifications_while_disconnected_dropped() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_connected(&mut sink);
    engine.disconnect(&mut sink);
    let before = sink.events.len();
    zepp_notify(&mut engine, at(0), battery::ENDPOINT, &[0x04, 50, 0], &mut sink);
    assert_eq!(sink.events.len(), before);
}

#[test]
fn moyoung_initializes_without_discovery() {
    let mut sink = RecordingSink::new();
    let engine = moyoung_connected(&mut sink);
    assert_eq!(engine.phase(), InitPhase::ServicesInitialized);
    assert!(engine.transport().written.is_empty());
    assert!(engine.state().is_supported(bandlink::services::moyoung::CMD_FIND_MY_PHONE));
}
