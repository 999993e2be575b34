//! Bandlink trace replay.
//!
//! Feeds a recorded notification trace through a [`DeviceEngine`] backed by
//! a recording transport and prints every event, error and written chunk.
//!
//! ```text
//!   trace.json ──▶ Step::Rx ───▶ DeviceEngine::on_notify ──▶ LogSink
//!                  Step::Tick ─▶ DeviceEngine::tick             │
//!                                        │                      ▼
//!                                        └──▶ RecordingTransport (chunks)
//! ```
//!
//! Trace format:
//! ```json
//! { "dialect": "ZeppOs", "mtu": 23,
//!   "steps": [ { "at_ms": 0, "rx": "0303000000..." }, { "at_ms": 1000, "tick": true } ] }
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result, bail};
use embassy_time::Instant;
use log::{error, info, warn};
use serde::Deserialize;

use bandlink::DeviceEngine;
use bandlink::app::events::DeviceEvent;
use bandlink::app::ports::{Characteristic, ErrorSink, EventSink, NoAuth, TransportPort};
use bandlink::config::{Dialect, EngineConfig};
use bandlink::error::{Error, TransportError};
use bandlink::protocol::FrameCodec;

// ── Trace model ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Trace {
    dialect: Dialect,
    mtu: usize,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Step {
    Rx { at_ms: u64, rx: String },
    Tick { at_ms: u64, tick: bool },
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if !text.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("non-hex characters in {:?}", text);
    }
    if text.len() % 2 != 0 {
        bail!("odd number of hex digits in {:?}", text);
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).with_context(|| format!("bad hex at offset {i}")))
        .collect()
}

// ── Adapters ──────────────────────────────────────────────────

/// Transport that keeps every chunk instead of sending it.
struct RecordingTransport {
    mtu: usize,
    written: Vec<Vec<u8>>,
}

impl TransportPort for RecordingTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        println!("TX   | {}", hex(data));
        self.written.push(data.to_vec());
        Ok(())
    }

    fn request_read(&mut self, characteristic: Characteristic) -> Result<(), TransportError> {
        println!("READ | {:?}", characteristic);
        Ok(())
    }

    fn negotiated_mtu(&self) -> usize {
        self.mtu
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Sink that prints events and errors to stdout.
struct LogSink {
    events: usize,
    errors: usize,
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &DeviceEvent) {
        self.events += 1;
        match event {
            DeviceEvent::PhaseChanged { from, to } => println!("INIT | {:?} -> {:?}", from, to),
            DeviceEvent::OperationProgress { label, percent } => println!("OP   | {} {}%", label, percent),
            DeviceEvent::FileReceived { url, filename, data } => {
                println!("FILE | {} ({}) {} bytes", filename, url, data.len());
            }
            other => println!("EVT  | {:?}", other),
        }
    }
}

impl ErrorSink for LogSink {
    fn report(&mut self, error: &Error) {
        self.errors += 1;
        println!("ERR  | {}", error);
    }
}

// ── Replay ────────────────────────────────────────────────────

fn replay<C: FrameCodec>(mut engine: DeviceEngine<C, RecordingTransport>, steps: &[Step]) -> Result<()> {
    let mut sink = LogSink { events: 0, errors: 0 };
    engine
        .connect(Instant::from_millis(0), &mut sink)
        .context("connect failed")?;

    for (i, step) in steps.iter().enumerate() {
        match step {
            Step::Rx { at_ms, rx } => {
                let raw = parse_hex(rx).with_context(|| format!("step {i}"))?;
                println!("RX   | {}", hex(&raw));
                if let Some(route) = engine.on_notify(Instant::from_millis(*at_ms), &raw, &mut sink) {
                    info!("step {}: routed {:?}", i, route);
                }
            }
            Step::Tick { at_ms, tick } => {
                if *tick {
                    engine.tick(Instant::from_millis(*at_ms), &mut sink);
                }
            }
        }
    }

    engine.disconnect(&mut sink);
    info!(
        "replay done: {} events, {} errors, {} chunks written",
        sink.events,
        sink.errors,
        engine.transport().written.len()
    );
    if sink.errors > 0 {
        warn!("replay reported {} errors", sink.errors);
    }
    Ok(())
}

fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: bandlink <trace.json>")?;
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let trace: Trace = serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;

    let config = EngineConfig::for_dialect(trace.dialect);
    config
        .validate()
        .context("invalid configuration")?;
    let transport = RecordingTransport {
        mtu: trace.mtu,
        written: Vec::new(),
    };
    info!("replaying {} steps from {} ({:?})", trace.steps.len(), path, trace.dialect);

    match trace.dialect {
        Dialect::ZeppOs => {
            let engine = DeviceEngine::zepp(config, transport, Box::new(NoAuth)).context("building engine")?;
            replay(engine, &trace.steps)
        }
        Dialect::Moyoung => {
            let engine = DeviceEngine::moyoung(config, transport).context("building engine")?;
            replay(engine, &trace.steps)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
