//! Long-running operations end to end: fan-out fetch, paged training data,
//! uploads and band-initiated file downloads.

use bandlink::app::events::{ActivityKind, DeviceEvent};
use bandlink::app::ports::Characteristic;
use bandlink::error::{Error, OperationError, TransportError};
use bandlink::operation::{FileOffer, TransferKind};
use bandlink::services::file_transfer::{self, DataChunk};
use bandlink::services::moyoung::{
    CMD_QUERY_LAST_DYNAMIC_RATE, CMD_QUERY_MOVEMENT_HEART_RATE, CMD_SYNC_PAST_SLEEP_AND_STEP, CMD_SYNC_SLEEP,
    FETCH_ACTIVITY_LABEL, FETCH_TRAINING_LABEL,
};

use crate::mock_device::*;

fn finished(sink: &RecordingSink) -> usize {
    sink.count(|e| matches!(e, DeviceEvent::OperationFinished(_)))
}

fn failed_with(sink: &RecordingSink) -> Vec<Error> {
    sink.events
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::OperationFailed { error, .. } => Some(*error),
            _ => None,
        })
        .collect()
}

// ── Fan-out ───────────────────────────────────────────────────

#[test]
fn activity_fetch_sends_vendor_order_and_completes_once() {
    let mut sink = RecordingSink::new();
    let mut engine = moyoung_connected(&mut sink);
    engine.start_activity_fetch(&mut sink).unwrap();
    assert_eq!(engine.busy_label(), Some(FETCH_ACTIVITY_LABEL));

    let sent: Vec<(u16, Vec<u8>)> = moyoung_written(&engine)
        .into_iter()
        .map(|f| (f.endpoint, f.payload))
        .collect();
    assert_eq!(
        sent,
        vec![
            (CMD_SYNC_PAST_SLEEP_AND_STEP, vec![3]),
            (CMD_SYNC_PAST_SLEEP_AND_STEP, vec![4]),
            (CMD_SYNC_SLEEP, vec![]),
            (CMD_SYNC_PAST_SLEEP_AND_STEP, vec![1]),
            (CMD_SYNC_PAST_SLEEP_AND_STEP, vec![2]),
            (CMD_QUERY_MOVEMENT_HEART_RATE, vec![]),
        ]
    );
    assert_eq!(engine.transport().reads, vec![Characteristic::Steps]);

    // Replies in a different order than the requests, with a duplicate.
    moyoung_notify(&mut engine, at(10), CMD_QUERY_MOVEMENT_HEART_RATE, &[9, 9], &mut sink);
    moyoung_notify(&mut engine, at(20), CMD_SYNC_PAST_SLEEP_AND_STEP, &[1, 0xaa], &mut sink);
    moyoung_notify(&mut engine, at(30), CMD_SYNC_PAST_SLEEP_AND_STEP, &[1, 0xaa], &mut sink);
    moyoung_notify(&mut engine, at(40), CMD_SYNC_SLEEP, &[0x01, 0x02], &mut sink);
    moyoung_notify(&mut engine, at(50), CMD_SYNC_PAST_SLEEP_AND_STEP, &[2, 0xbb], &mut sink);
    moyoung_notify(&mut engine, at(60), CMD_SYNC_PAST_SLEEP_AND_STEP, &[3, 0xcc], &mut sink);
    assert!(engine.is_busy());
    engine.on_read(Characteristic::Steps, &[0x10, 0x27, 0, 0], &mut sink);
    assert!(engine.is_busy());
    moyoung_notify(&mut engine, at(70), CMD_SYNC_PAST_SLEEP_AND_STEP, &[4, 0xdd], &mut sink);

    assert!(!engine.is_busy());
    assert_eq!(finished(&sink), 1);
    assert!(sink.events.contains(&DeviceEvent::ActivityData {
        kind: ActivityKind::Steps,
        days_ago: 2,
        data: vec![0xaa],
    }));
    assert!(sink.events.contains(&DeviceEvent::ActivityData {
        kind: ActivityKind::Sleep,
        days_ago: 1,
        data: vec![0xdd],
    }));
    assert!(sink.events.contains(&DeviceEvent::TrainingSummary(vec![9, 9])));

    // A late reply after completion neither restarts nor re-finishes.
    moyoung_notify(&mut engine, at(80), CMD_SYNC_SLEEP, &[0x03], &mut sink);
    assert_eq!(finished(&sink), 1);
}

#[test]
fn activity_fetch_only_on_moyoung() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    assert!(matches!(engine.start_activity_fetch(&mut sink), Err(Error::Config(_))));
    assert!(!engine.is_busy());
}

// ── Paged ─────────────────────────────────────────────────────

#[test]
fn training_pages_pulled_until_last() {
    let mut sink = RecordingSink::new();
    let mut engine = moyoung_connected(&mut sink);

    let start: u32 = 0x6543_2100;
    let mut first = vec![0];
    first.extend(start.to_le_bytes());
    first.extend([61, 62]);
    moyoung_notify(&mut engine, at(0), CMD_QUERY_LAST_DYNAMIC_RATE, &first, &mut sink);
    assert_eq!(engine.busy_label(), Some(FETCH_TRAINING_LABEL));

    // Another claim is refused while the watch is paging.
    assert_eq!(
        engine.start_activity_fetch(&mut sink),
        Err(OperationError::Busy.into())
    );

    moyoung_notify(&mut engine, at(100), CMD_QUERY_LAST_DYNAMIC_RATE, &[1, 63], &mut sink);
    moyoung_notify(&mut engine, at(200), CMD_QUERY_LAST_DYNAMIC_RATE, &[2], &mut sink);

    assert!(!engine.is_busy());
    assert!(sink.events.contains(&DeviceEvent::TrainingSamples {
        start_time: start,
        samples: vec![61, 62, 63],
    }));
    let sent: Vec<u16> = moyoung_written(&engine).iter().map(|f| f.endpoint).collect();
    assert_eq!(
        sent,
        vec![
            CMD_QUERY_LAST_DYNAMIC_RATE,
            CMD_QUERY_LAST_DYNAMIC_RATE,
            CMD_QUERY_MOVEMENT_HEART_RATE
        ]
    );
}

#[test]
fn stray_continuation_page_ignored() {
    let mut sink = RecordingSink::new();
    let mut engine = moyoung_connected(&mut sink);
    moyoung_notify(&mut engine, at(0), CMD_QUERY_LAST_DYNAMIC_RATE, &[1, 70], &mut sink);
    assert!(!engine.is_busy());
    assert!(engine.transport().written.is_empty());
}

// ── Upload ────────────────────────────────────────────────────

#[test]
fn upload_reports_progress_and_finishes() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.begin_transfer(TransferKind::Agps, 0x0777, 100, &mut sink).unwrap();
    assert_eq!(engine.busy_label(), Some("Uploading AGPS"));
    assert_eq!(
        engine.begin_transfer(TransferKind::Gpx, 0x0777, 10, &mut sink),
        Err(OperationError::Busy.into())
    );

    assert_eq!(engine.send_transfer_chunk(0, &[1; 40], &mut sink), Ok(40));
    assert_eq!(engine.send_transfer_chunk(40, &[2; 60], &mut sink), Ok(100));

    assert!(!engine.is_busy());
    assert_eq!(finished(&sink), 1);
    let percents: Vec<u8> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::OperationProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![40, 100]);
    let body: Vec<u8> = payloads_to(&zepp_written(&engine), 0x0777).concat();
    assert_eq!(body.len(), 100);
}

#[test]
fn out_of_order_upload_chunk_fails_operation() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.begin_transfer(TransferKind::Firmware, 0x0777, 100, &mut sink).unwrap();
    engine.send_transfer_chunk(0, &[0; 10], &mut sink).unwrap();
    assert_eq!(
        engine.send_transfer_chunk(50, &[0; 10], &mut sink),
        Err(OperationError::NonSequential.into())
    );
    assert!(!engine.is_busy());
    assert_eq!(failed_with(&sink), vec![Error::from(OperationError::NonSequential)]);
    assert_eq!(payloads_to(&zepp_written(&engine), 0x0777).len(), 1);
}

#[test]
fn transport_failure_mid_upload_fails_once() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.begin_transfer(TransferKind::Firmware, 0x0777, 100, &mut sink).unwrap();
    engine.send_transfer_chunk(0, &[0; 10], &mut sink).unwrap();

    let written = engine.transport().written.len();
    engine.transport_mut().fail_after = Some(written);
    let _ = engine.send_transfer_chunk(10, &[0; 10], &mut sink);

    assert!(!engine.is_busy());
    assert_eq!(engine.queued(), 0);
    assert_eq!(failed_with(&sink), vec![Error::from(OperationError::TransportFailed)]);
    assert!(sink.errors.contains(&Error::from(TransportError::Io)));
    assert_eq!(
        engine.send_transfer_chunk(20, &[0; 10], &mut sink),
        Err(OperationError::NotRunning.into())
    );
}

#[test]
fn failed_write_of_last_chunk_does_not_finish_upload() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.begin_transfer(TransferKind::Gpx, 0x0777, 20, &mut sink).unwrap();
    assert_eq!(engine.send_transfer_chunk(0, &[0; 10], &mut sink), Ok(50));

    let written = engine.transport().written.len();
    engine.transport_mut().fail_after = Some(written);
    assert_eq!(
        engine.send_transfer_chunk(10, &[0; 10], &mut sink),
        Err(TransportError::Io.into())
    );

    assert!(!engine.is_busy());
    assert_eq!(finished(&sink), 0);
    assert_eq!(failed_with(&sink), vec![Error::from(OperationError::TransportFailed)]);
    assert_eq!(engine.operations().busy_clears(), 1);
}

#[test]
fn firmware_chunk_spanning_many_writes_is_uploaded() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.begin_transfer(TransferKind::Firmware, 0x0777, 4096, &mut sink).unwrap();

    for (i, offset) in (0..4096u32).step_by(1024).enumerate() {
        let percent = ((i + 1) * 25) as u8;
        assert_eq!(engine.send_transfer_chunk(offset, &[i as u8; 1024], &mut sink), Ok(percent));
    }

    assert!(!engine.is_busy());
    assert_eq!(finished(&sink), 1);
    assert!(sink.errors.is_empty());
    let body: Vec<u8> = payloads_to(&zepp_written(&engine), 0x0777).concat();
    assert_eq!(body.len(), 4096);
}

#[test]
fn disconnect_fails_running_upload() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[]);
    engine.begin_transfer(TransferKind::Gpx, 0x0777, 100, &mut sink).unwrap();
    engine.disconnect(&mut sink);
    assert!(!engine.is_busy());
    assert_eq!(failed_with(&sink), vec![Error::from(OperationError::Disconnected)]);
}

// ── Download ──────────────────────────────────────────────────

fn offer(session: u8, body: &[u8], crc32: u32) -> FileOffer {
    FileOffer {
        session,
        url: "zepp://notifications".into(),
        filename: "reply.bin".into(),
        length: body.len() as u32,
        crc32,
        compressed: false,
    }
}

fn chunk(session: u8, index: u8, first: bool, last: bool, data: &[u8]) -> Vec<u8> {
    file_transfer::encode_chunk(&DataChunk {
        first,
        last,
        session,
        index,
        data,
    })
}

#[test]
fn band_pushed_file_delivered_after_crc_check() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(file_transfer::ENDPOINT, false)]);
    let body = b"short canned reply text";

    let ep = file_transfer::ENDPOINT;
    zepp_notify(
        &mut engine,
        at(0),
        ep,
        &file_transfer::encode_offer(&offer(5, body, crc32fast::hash(body))),
        &mut sink,
    );
    assert!(engine.is_busy());
    zepp_notify(&mut engine, at(10), ep, &chunk(5, 0, true, false, &body[..10]), &mut sink);
    zepp_notify(&mut engine, at(20), ep, &chunk(5, 1, false, true, &body[10..]), &mut sink);

    assert!(!engine.is_busy());
    assert!(sink.events.contains(&DeviceEvent::FileReceived {
        url: "zepp://notifications".into(),
        filename: "reply.bin".into(),
        data: body.to_vec(),
    }));
    let replies = payloads_to(&zepp_written(&engine), ep);
    assert_eq!(replies[0], vec![0x01]);
    assert_eq!(replies[1], vec![0x04, 5, 0x00, 0, 0, 0, 0]);
    assert_eq!(replies[2..], [vec![0x11, 5, 0x00], vec![0x11, 5, 0x00]]);
}

#[test]
fn crc_mismatch_nacked_and_failed() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(file_transfer::ENDPOINT, false)]);
    let body = b"payload";
    let ep = file_transfer::ENDPOINT;

    zepp_notify(&mut engine, at(0), ep, &file_transfer::encode_offer(&offer(9, body, 0xdead_beef)), &mut sink);
    zepp_notify(&mut engine, at(10), ep, &chunk(9, 0, true, true, body), &mut sink);

    assert!(!engine.is_busy());
    assert_eq!(sink.count(|e| matches!(e, DeviceEvent::FileReceived { .. })), 0);
    assert_eq!(failed_with(&sink), vec![Error::from(OperationError::ChecksumMismatch)]);
    let replies = payloads_to(&zepp_written(&engine), ep);
    assert_eq!(replies.last(), Some(&vec![0x11, 9, 0x01]));
}

#[test]
fn offer_rejected_while_busy() {
    let mut sink = RecordingSink::new();
    let mut engine = zepp_ready(&mut sink, &[service(file_transfer::ENDPOINT, false)]);
    engine.begin_transfer(TransferKind::Firmware, 0x0777, 100, &mut sink).unwrap();

    let ep = file_transfer::ENDPOINT;
    zepp_notify(&mut engine, at(0), ep, &file_transfer::encode_offer(&offer(2, b"x", 0)), &mut sink);
    assert_eq!(engine.busy_label(), Some("Uploading firmware"));
    let replies = payloads_to(&zepp_written(&engine), ep);
    assert_eq!(replies.last(), Some(&vec![0x04, 2, 0x01, 0, 0, 0, 0]));
}
