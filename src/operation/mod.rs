//! Operation tracking: exclusive multi-request exchanges.
//!
//! At most one [`Operation`] runs per device. While it runs the device is
//! busy, and "busy" is simply `current.is_some()`. Every terminal
//! transition goes through `current.take()`, so busy state is cleared
//! exactly once however the operation ends.
//!
//! ```text
//!            start()                 mark_received() / page() /
//!   Idle ─────────────▶ Running ───▶ transfer_chunk() / download_chunk()
//!     ▲                   │  │
//!     │      finish()     │  │ fail(cause) ──▶ ErrorSink
//!     └───────────────────┘  │
//!     └──────────────────────┘
//! ```
//!
//! Shapes:
//! - [`FanOut`]: fixed set of sub-responses, complete when all arrived.
//! - [`PagedFetch`]: request the next page until a terminator page.
//! - [`Transfer`]: upload with percent progress.
//! - [`FileDownload`]: band-initiated file push with CRC32 check.

pub mod download;
pub mod fetch;
pub mod paged;
pub mod transfer;

use log::{debug, error, info, warn};

use crate::app::events::DeviceEvent;
use crate::error::{Error, OperationError};
use crate::outbox::Outbox;

pub use download::{FileDownload, FileOffer, ReceivedFile};
pub use fetch::{FanOut, SubResponse};
pub use paged::{PageOutcome, PagedFetch};
pub use transfer::{Transfer, TransferKind};

/// Human-readable busy label shown while an operation runs.
pub type Label = heapless::String<32>;

/// Build a label, truncating at a character boundary if needed.
pub fn make_label(text: &str) -> Label {
    let mut label = Label::new();
    for c in text.chars() {
        if label.push(c).is_err() {
            break;
        }
    }
    label
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Shape {
    FanOut(FanOut),
    Paged(PagedFetch),
    Transfer(Transfer),
    Download(FileDownload),
}

#[derive(Debug, Clone)]
pub struct Operation {
    label: Label,
    shape: Shape,
}

impl Operation {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

#[derive(Debug, Default)]
pub struct OperationTracker {
    current: Option<Operation>,
    last_status: Option<OperationStatus>,
    busy_clears: u32,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn busy_label(&self) -> Option<&str> {
        self.current.as_ref().map(Operation::label)
    }

    pub fn current(&self) -> Option<&Operation> {
        self.current.as_ref()
    }

    /// Status of the most recent operation, running or ended.
    pub fn last_status(&self) -> Option<OperationStatus> {
        self.last_status
    }

    /// How many times busy state has been cleared.
    pub fn busy_clears(&self) -> u32 {
        self.busy_clears
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Claim the device for a new operation. Rejected while one runs.
    pub fn start(&mut self, label: &str, shape: Shape, out: &mut Outbox) -> Result<(), OperationError> {
        if let Some(running) = &self.current {
            warn!("Op: '{}' rejected, busy with '{}'", label, running.label);
            return Err(OperationError::Busy);
        }
        let label = make_label(label);
        info!("Op: '{}' started", label);
        out.emit(DeviceEvent::OperationStarted(label.clone()));
        self.current = Some(Operation { label, shape });
        self.last_status = Some(OperationStatus::Running);
        Ok(())
    }

    fn finish(&mut self, out: &mut Outbox) {
        if let Some(op) = self.current.take() {
            info!("Op: '{}' finished", op.label);
            out.emit(DeviceEvent::OperationFinished(op.label));
            self.last_status = Some(OperationStatus::Finished);
            self.busy_clears += 1;
        }
    }

    /// Abort the running operation and surface `cause` to the error sink.
    ///
    /// Returns `false` when nothing was running.
    pub fn fail(&mut self, cause: Error, out: &mut Outbox) -> bool {
        let Some(op) = self.current.take() else {
            return false;
        };
        error!("Op: '{}' failed: {}", op.label, cause);
        out.report(cause);
        out.emit(DeviceEvent::OperationFailed {
            label: op.label,
            error: cause,
        });
        self.last_status = Some(OperationStatus::Failed);
        self.busy_clears += 1;
        true
    }

    fn progress(label: &Label, percent: u8, out: &mut Outbox) {
        debug!("Op: '{}' {}%", label, percent);
        out.emit(DeviceEvent::OperationProgress {
            label: label.clone(),
            percent,
        });
    }

    // ── Fan-out ───────────────────────────────────────────────

    /// Record a fan-out sub-response. Returns `None` when no fan-out runs.
    pub fn mark_received(&mut self, id: SubResponse, out: &mut Outbox) -> Option<OperationStatus> {
        let Some(Operation {
            label,
            shape: Shape::FanOut(fan_out),
        }) = &mut self.current
        else {
            debug!("Op: {:?} arrived outside a fan-out fetch", id);
            return None;
        };

        if !fan_out.mark(id) {
            debug!("Op: '{}' ignoring repeated {:?}", label, id);
            return Some(OperationStatus::Running);
        }
        Self::progress(label, fan_out.percent(), out);

        if fan_out.is_complete() {
            self.finish(out);
            Some(OperationStatus::Finished)
        } else {
            Some(OperationStatus::Running)
        }
    }

    // ── Paged ─────────────────────────────────────────────────

    pub fn is_paging(&self) -> bool {
        matches!(
            self.current,
            Some(Operation {
                shape: Shape::Paged(_),
                ..
            })
        )
    }

    /// Feed one page (role byte first). Errors fail the operation.
    pub fn page(&mut self, page: &[u8], out: &mut Outbox) -> Result<PageOutcome, OperationError> {
        let Some(Operation {
            shape: Shape::Paged(paged),
            ..
        }) = &mut self.current
        else {
            return Err(OperationError::NotRunning);
        };

        match paged.accept(page) {
            Ok(PageOutcome::More) => Ok(PageOutcome::More),
            Ok(done @ PageOutcome::Complete(_)) => {
                self.finish(out);
                Ok(done)
            }
            Err(e) => {
                self.fail(e.into(), out);
                Err(e)
            }
        }
    }

    // ── Transfer ──────────────────────────────────────────────

    /// Endpoint of the running transfer.
    pub fn transfer_endpoint(&self) -> Result<u16, OperationError> {
        match &self.current {
            Some(Operation {
                shape: Shape::Transfer(t),
                ..
            }) => Ok(t.endpoint()),
            _ => Err(OperationError::NotRunning),
        }
    }

    /// Validate the next upload chunk before it is sent. A rejected chunk
    /// fails the transfer.
    pub fn check_transfer_chunk(&mut self, offset: u32, len: u32, out: &mut Outbox) -> Result<(), OperationError> {
        let Some(Operation {
            shape: Shape::Transfer(transfer),
            ..
        }) = &self.current
        else {
            return Err(OperationError::NotRunning);
        };
        if let Err(e) = transfer.check_chunk(offset, len) {
            self.fail(e.into(), out);
            return Err(e);
        }
        Ok(())
    }

    /// Account for a chunk the transport accepted. Returns percent complete.
    pub fn transfer_chunk(&mut self, offset: u32, len: u32, out: &mut Outbox) -> Result<u8, OperationError> {
        let Some(Operation {
            label,
            shape: Shape::Transfer(transfer),
        }) = &mut self.current
        else {
            return Err(OperationError::NotRunning);
        };

        if let Err(e) = transfer.write_chunk(offset, len) {
            self.fail(e.into(), out);
            return Err(e);
        }
        if let Some(percent) = transfer.take_progress() {
            Self::progress(label, percent, out);
        }
        let percent = transfer.percent();
        if transfer.is_complete() {
            self.finish(out);
        }
        Ok(percent)
    }

    // ── Download ──────────────────────────────────────────────

    /// Feed a file-transfer chunk for `session`.
    ///
    /// Chunks for another session are refused without touching the running
    /// download; sequence and checksum errors fail it.
    pub fn download_chunk(
        &mut self,
        session: u8,
        index: u8,
        last: bool,
        chunk: &[u8],
        out: &mut Outbox,
    ) -> Result<Option<ReceivedFile>, OperationError> {
        let Some(Operation {
            label,
            shape: Shape::Download(download),
        }) = &mut self.current
        else {
            return Err(OperationError::NotRunning);
        };
        if download.session() != session {
            warn!(
                "Op: chunk for session {} while '{}' uses {}",
                session,
                label,
                download.session()
            );
            return Err(OperationError::NotRunning);
        }

        match download.accept_chunk(index, last, chunk) {
            Ok(None) => {
                Self::progress(label, download.percent(), out);
                Ok(None)
            }
            Ok(Some(file)) => {
                self.finish(out);
                Ok(Some(file))
            }
            Err(e) => {
                self.fail(e.into(), out);
                Err(e)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
