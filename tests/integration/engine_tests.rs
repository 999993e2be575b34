//! Engine-level routing, find-phone debounce, keep-alive and encryption.

use bandlink::DeviceEngine;
use bandlink::app::events::{BatteryInfo, DeviceEvent, FindPhoneEvent};
use bandlink::app::ports::{SessionCipher, SessionKey};
use bandlink::config::EngineConfig;
use bandlink::init::ZEPP_AUTH_ENDPOINT;
use bandlink::legacy;
use bandlink::protocol::{FrameCodec, ZeppCodec};
use bandlink::registry::Route;
use bandlink::services::heart_rate::{self, RealtimeMode};
use bandlink::services::{battery, connection, discovery, find_device, moyoung};

use crate::mock_device::*;

const KEY: SessionKey = [0x5a; 16];

fn find_phone_events(sink: &RecordingSink) -> Vec<FindPhoneEvent> {
    sink.events
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::FindPhone(f) => Some(*f),
            _ => None,
        })
        .collect()
}

fn steps_reply(steps: u16) -> Vec<u8> {
    let mut payload = vec![0x04, 0x01];
    let mut block = vec![0u8; 13];
    block[1..3].copy_from_slice(&steps.to_le_bytes());
    payload.extend(block);
    payload
}

/// Engine with the scripted handshake, cipher installed, waiting in Phase3.
fn authenticated(sink: &mut RecordingSink) -> ZeppEngine {
    let mut engine = DeviceEngine::zepp(
        EngineConfig::default(),
        MockTransport::new(23),
        Box::new(ScriptedAuth { key: KEY }),
    )
    .expect("zepp engine");
    engine.set_cipher(Box::new(XorCipher));
    engine.connect(at(0), sink).expect("connect");
    zepp_notify(&mut engine, at(0), ZEPP_AUTH_ENDPOINT, &[0x10, 0x01], sink);
    engine
}

fn notify_encrypted(engine: &mut ZeppEngine, endpoint: u16, plain: &[u8], sink: &mut RecordingSink) -> Option<Route> {
    let sealed = XorCipher.encrypt(&KEY, plain);
    let mtu = engine.state().mtu();
    let mut route = None;
    for chunk in ZeppCodec.encode(0x41, endpoint, &sealed, mtu, true).expect("encode") {
        route = engine.on_notify(at(0), &chunk, sink);
    }
    route
}

// ── Routing ───────────────────────────────────────────────────

#[test]
fn battery_reply_reaches_sink() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(battery::ENDPOINT, false)]);
    let mut reply = vec![0u8; 21];
    reply[0] = 0x04;
    reply[1] = 87;
    reply[2] = 0x01;
    zepp_notify(&mut engine, at(10), battery::ENDPOINT, &reply, &mut sink);
    assert!(sink.events.contains(&DeviceEvent::Battery(BatteryInfo {
        level: 87,
        charging: true
    })));
}

#[test]
fn legacy_endpoint_decoded_without_a_handler() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    let mtu = engine.state().mtu();
    let payload = steps_reply(4321);
    let mut route = None;
    for chunk in ZeppCodec.encode(0x40, legacy::STEPS, &payload, mtu, false).unwrap() {
        route = engine.on_notify(at(0), &chunk, &mut sink);
    }
    assert_eq!(route, Some(Route::Legacy));
    assert!(sink.events.contains(&DeviceEvent::Steps(4321)));
}

#[test]
fn unknown_endpoint_is_unhandled() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    let before = sink.events.len();
    let chunks = ZeppCodec.encode(0x40, 0x0777, &[0x01, 0x02], 23, false).unwrap();
    let route = chunks.iter().filter_map(|c| engine.on_notify(at(0), c, &mut sink)).last();
    assert_eq!(route, Some(Route::Unhandled));
    assert_eq!(sink.events.len(), before);
    assert!(sink.errors.is_empty());
}

#[test]
fn ping_answered_with_pong() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(connection::ENDPOINT, false)]);
    zepp_notify(&mut engine, at(0), connection::ENDPOINT, &[0x03], &mut sink);
    let sent = payloads_to(&zepp_written(&engine), connection::ENDPOINT);
    assert_eq!(sent.last(), Some(&vec![0x04]));
}

#[test]
fn configure_reaches_handler_then_legacy_default() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(battery::ENDPOINT, false)]);
    let battery_before = payloads_to(&zepp_written(&engine), battery::ENDPOINT).len();

    assert!(engine.configure("battery", &mut sink));
    assert!(engine.configure("steps", &mut sink));
    assert!(engine.configure("silent_mode", &mut sink));
    assert!(!engine.configure("wallpaper", &mut sink));

    let frames = zepp_written(&engine);
    assert_eq!(payloads_to(&frames, battery::ENDPOINT).len(), battery_before + 1);
    assert_eq!(payloads_to(&frames, legacy::STEPS), vec![vec![0x03]]);
    assert_eq!(payloads_to(&frames, legacy::SILENT_MODE).len(), 1);
}

#[test]
fn configure_after_disconnect_writes_nothing() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(battery::ENDPOINT, false)]);
    engine.disconnect(&mut sink);
    let before = engine.transport().written.len();

    assert!(!engine.configure("steps", &mut sink));
    assert!(!engine.configure("battery", &mut sink));
    assert_eq!(engine.transport().written.len(), before);
    assert_eq!(engine.queued(), 0);
}

#[test]
fn frame_longer_than_queue_depth_is_sent_whole() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    let before = engine.transport().written.len();
    let payload = vec![0xab; 1000];

    engine.send(0x0777, payload.clone(), None, &mut sink).unwrap();

    let chunks = engine.transport().written.len() - before;
    assert!(chunks > bandlink::protocol::queue::OUTBOUND_DEPTH);
    assert_eq!(payloads_to(&zepp_written(&engine), 0x0777), vec![payload]);
    assert!(sink.errors.is_empty());
}

#[test]
fn announced_mtu_widens_outbound_chunks() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(connection::ENDPOINT, false)]);
    zepp_notify(&mut engine, at(0), connection::ENDPOINT, &[0x02, 0xf4, 0x00], &mut sink);
    assert_eq!(engine.state().mtu(), 247);
    assert!(sink.events.contains(&DeviceEvent::MtuChanged(247)));

    let before = engine.transport().written.len();
    engine.send(0x0777, vec![0xaa; 200], None, &mut sink).unwrap();
    assert_eq!(engine.transport().written.len(), before + 1);
    assert!(engine.transport().written.iter().all(|c| c.len() <= 247));
}

#[test]
fn tiny_mtu_announcement_ignored() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(connection::ENDPOINT, false)]);
    zepp_notify(&mut engine, at(0), connection::ENDPOINT, &[0x02, 0x02, 0x00], &mut sink);
    assert_eq!(engine.state().mtu(), 23);
    assert_eq!(sink.count(|e| matches!(e, DeviceEvent::MtuChanged(_))), 0);
}

// ── Find phone ────────────────────────────────────────────────

#[test]
fn start_then_quick_mode_merges_into_one_event() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(find_device::ENDPOINT, false)]);

    zepp_notify(&mut engine, at(0), find_device::ENDPOINT, &[0x11], &mut sink);
    assert_eq!(
        payloads_to(&zepp_written(&engine), find_device::ENDPOINT),
        vec![vec![0x12, 0x00]]
    );
    engine.tick(at(1_000), &mut sink);
    assert!(find_phone_events(&sink).is_empty());

    zepp_notify(&mut engine, at(1_400), find_device::ENDPOINT, &[0x15, 0x00], &mut sink);
    engine.tick(at(3_000), &mut sink);
    assert_eq!(find_phone_events(&sink), vec![FindPhoneEvent::StartVibrate]);
}

#[test]
fn slow_mode_follows_the_debounced_start() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(find_device::ENDPOINT, false)]);

    zepp_notify(&mut engine, at(0), find_device::ENDPOINT, &[0x11], &mut sink);
    engine.tick(at(1_500), &mut sink);
    zepp_notify(&mut engine, at(2_000), find_device::ENDPOINT, &[0x15, 0x01], &mut sink);
    assert_eq!(
        find_phone_events(&sink),
        vec![FindPhoneEvent::Start, FindPhoneEvent::Ring]
    );

    zepp_notify(&mut engine, at(5_000), find_device::ENDPOINT, &[0x13], &mut sink);
    assert_eq!(find_phone_events(&sink).last(), Some(&FindPhoneEvent::Stop));
}

#[test]
fn mode_without_start_reports_start_then_ring() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(find_device::ENDPOINT, false)]);

    zepp_notify(&mut engine, at(0), find_device::ENDPOINT, &[0x15, 0x01], &mut sink);
    assert_eq!(find_phone_events(&sink), vec![FindPhoneEvent::Start]);
    assert!(engine.scheduler().find_phone_active());

    zepp_notify(&mut engine, at(500), find_device::ENDPOINT, &[0x15, 0x00], &mut sink);
    assert_eq!(
        find_phone_events(&sink),
        vec![FindPhoneEvent::Start, FindPhoneEvent::Vibrate]
    );
}

#[test]
fn phone_side_stop_and_find_band() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(find_device::ENDPOINT, false)]);
    engine.stop_find_phone(&mut sink).unwrap();
    engine.find_band(true, &mut sink).unwrap();
    assert_eq!(
        payloads_to(&zepp_written(&engine), find_device::ENDPOINT),
        vec![vec![0x14], vec![0x03]]
    );
}

#[test]
fn moyoung_find_phone_is_immediate() {
    let mut sink = RecordingSink::new();
    let mut engine = moyoung_connected(&mut sink);
    moyoung_notify(&mut engine, at(0), moyoung::CMD_FIND_MY_PHONE, &[0x00], &mut sink);
    moyoung_notify(&mut engine, at(100), moyoung::CMD_FIND_MY_PHONE, &[0x01], &mut sink);
    assert_eq!(
        find_phone_events(&sink),
        vec![FindPhoneEvent::Start, FindPhoneEvent::Stop]
    );

    engine.stop_find_phone(&mut sink).unwrap();
    assert_eq!(
        payloads_to(&moyoung_written(&engine), moyoung::CMD_FIND_MY_PHONE),
        vec![vec![0xff]]
    );
    assert!(engine.find_band(true, &mut sink).is_err());
}

// ── Keep-alive ────────────────────────────────────────────────

#[test]
fn realtime_heart_rate_start_continue_stop() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(heart_rate::ENDPOINT, false)]);

    assert!(engine.set_realtime_heart_rate(at(0), true, &mut sink).unwrap());
    assert!(!engine.set_realtime_heart_rate(at(100), true, &mut sink).unwrap());
    engine.tick(at(500), &mut sink);
    engine.tick(at(1_000), &mut sink);
    engine.tick(at(2_000), &mut sink);
    assert!(engine.set_realtime_heart_rate(at(2_100), false, &mut sink).unwrap());
    engine.tick(at(5_000), &mut sink);

    assert_eq!(
        payloads_to(&zepp_written(&engine), heart_rate::ENDPOINT),
        vec![
            heart_rate::realtime(RealtimeMode::Start),
            heart_rate::realtime(RealtimeMode::Continue),
            heart_rate::realtime(RealtimeMode::Continue),
            heart_rate::realtime(RealtimeMode::Stop),
        ]
    );
    assert!(engine.scheduler().is_idle());
}

#[test]
fn raw_sensor_runs_on_its_own_interval() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.set_raw_sensor(at(0), true, &mut sink).unwrap();
    engine.tick(at(9_000), &mut sink);
    engine.tick(at(10_000), &mut sink);
    let sent = payloads_to(&zepp_written(&engine), legacy::STEPS);
    assert_eq!(sent, vec![vec![0x05, 0x01], vec![0x05, 0x02]]);
}

// ── Encryption ────────────────────────────────────────────────

#[test]
fn handshake_installs_key_and_sends_on_auth_endpoint() {
    let mut sink = RecordingSink::new();
    let engine = authenticated(&mut sink);
    let frames = zepp_written(&engine);
    assert_eq!(payloads_to(&frames, ZEPP_AUTH_ENDPOINT), vec![vec![0x01]]);
    assert!(engine.state().session_key().is_some());
    assert_eq!(payloads_to(&frames, discovery::ENDPOINT).len(), 1);
}

#[test]
fn discovered_encryption_flag_wins_on_outbound() {
    let mut sink = RecordingSink::new();
    let mut engine = authenticated(&mut sink);
    zepp_notify(
        &mut engine,
        at(0),
        discovery::ENDPOINT,
        &discovery::encode_response(&[service(heart_rate::ENDPOINT, true)]),
        &mut sink,
    );

    // Explicitly asked for plaintext; the device says encrypted.
    engine
        .send(heart_rate::ENDPOINT, heart_rate::realtime(RealtimeMode::Start), Some(false), &mut sink)
        .unwrap();
    engine
        .send(heart_rate::ENDPOINT, heart_rate::realtime(RealtimeMode::Stop), Some(false), &mut sink)
        .unwrap();

    let frames: Vec<_> = zepp_written(&engine)
        .into_iter()
        .filter(|f| f.endpoint == heart_rate::ENDPOINT)
        .collect();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.encrypted));
    assert_eq!(
        XorCipher.decrypt(&KEY, &frames[0].payload),
        Some(heart_rate::realtime(RealtimeMode::Start))
    );
    assert!(sink.errors.is_empty());
}

#[test]
fn encrypted_inbound_frames_decrypted_or_dropped() {
    let mut sink = RecordingSink::new();
    let mut engine = authenticated(&mut sink);
    zepp_notify(
        &mut engine,
        at(0),
        discovery::ENDPOINT,
        &discovery::encode_response(&[service(heart_rate::ENDPOINT, true)]),
        &mut sink,
    );

    let route = notify_encrypted(&mut engine, heart_rate::ENDPOINT, &[0x06, 0x01], &mut sink);
    assert_eq!(route, Some(Route::Handler));
    assert!(sink.events.contains(&DeviceEvent::SleepState(true)));

    // Right flag, wrong key material: the marker check fails.
    let garbage = ZeppCodec.encode(0x42, heart_rate::ENDPOINT, &[0x01, 0x02], 23, true).unwrap();
    let route = garbage.iter().filter_map(|c| engine.on_notify(at(0), c, &mut sink)).last();
    assert_eq!(route, None);
    assert_eq!(sink.count(|e| matches!(e, DeviceEvent::SleepState(_))), 1);
}

#[test]
fn encrypted_inbound_without_key_dropped() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(heart_rate::ENDPOINT, false)]);
    let chunks = ZeppCodec.encode(0x40, heart_rate::ENDPOINT, &[0x06, 0x01], 23, true).unwrap();
    for chunk in &chunks {
        assert_eq!(engine.on_notify(at(0), chunk, &mut sink), None);
    }
    assert_eq!(sink.count(|e| matches!(e, DeviceEvent::SleepState(_))), 0);
}

#[test]
fn encrypted_send_without_key_reports_error() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(heart_rate::ENDPOINT, true)]);
    let before = engine.transport().written.len();
    assert!(
        engine
            .send(heart_rate::ENDPOINT, heart_rate::realtime(RealtimeMode::Start), None, &mut sink)
            .is_err()
    );
    assert_eq!(engine.transport().written.len(), before);
}
