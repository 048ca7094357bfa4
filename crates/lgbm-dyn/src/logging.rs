//! Native log stream reassembly.
//!
//! LightGBM reports progress through a callback that receives raw text
//! pieces, one call each for the severity header, the message body and the
//! terminating newline:
//!
//! ```text
//! "[LightGBM] [Info] "
//! "Total Bins 1020"
//! "\n"
//! ```
//!
//! The callback may run on any native thread and must never block, so it
//! only pushes the line into a small bounded queue and drops it when the
//! queue is full. A dedicated consumer thread runs [`LogReassembler`] over
//! the queue and hands each completed [`LogRecord`] to the registered
//! observer. The observer is only ever invoked from that thread, one record
//! at a time.
//!
//! # Example
//!
//! ```
//! use lgbm_dyn::logging::LogReassembler;
//!
//! let mut asm = LogReassembler::new();
//! assert!(asm.feed("[LightGBM] [Info]").is_none());
//! assert!(asm.feed("Start training").is_none());
//! let record = asm.feed("").unwrap();
//! assert_eq!(record.severity, "INFO");
//! assert_eq!(record.message, "Start training");
//! ```

use std::ffi::{c_char, CStr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::RwLock;

use crate::ffi::Api;

/// Lines buffered between the native callback and the consumer thread.
pub const LOG_QUEUE_CAPACITY: usize = 4;

const HEADER_TAG: &str = "[LightGBM]";

// =============================================================================
// LogRecord
// =============================================================================

/// One complete native log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Upper-cased severity from the header, e.g. `INFO` or `WARNING`.
    pub severity: String,
    /// Body lines joined with single spaces.
    pub message: String,
}

impl LogRecord {
    /// Map the native severity onto a [`log::Level`].
    pub fn level(&self) -> log::Level {
        match self.severity.as_str() {
            "FATAL" | "ERROR" => log::Level::Error,
            "WARNING" | "WARN" => log::Level::Warn,
            "INFO" => log::Level::Info,
            "DEBUG" => log::Level::Debug,
            _ => log::Level::Trace,
        }
    }
}

/// Callback receiving reassembled records.
pub type LogObserver = Arc<dyn Fn(&LogRecord) + Send + Sync>;

// =============================================================================
// LogReassembler
// =============================================================================

/// Turns raw callback lines back into whole messages.
///
/// Idle until a header line sets the severity, then accumulating body lines
/// until a blank line flushes the message. A header seen while accumulating
/// restarts the message and discards the pending body.
#[derive(Debug, Default)]
pub struct LogReassembler {
    severity: Option<String>,
    body: Vec<String>,
}

impl LogReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a header has been seen and not yet flushed.
    pub fn is_accumulating(&self) -> bool {
        self.severity.is_some()
    }

    /// Consume one raw line, returning a record when a message completes.
    pub fn feed(&mut self, line: &str) -> Option<LogRecord> {
        let line = line.trim();

        if line.is_empty() {
            let severity = self.severity.take();
            let body = std::mem::take(&mut self.body);
            return match severity {
                Some(severity) if !body.is_empty() => Some(LogRecord {
                    severity,
                    message: body.join(" "),
                }),
                _ => None,
            };
        }

        if let Some(severity) = parse_header(line) {
            self.severity = Some(severity.to_uppercase());
            self.body.clear();
        } else if self.severity.is_some() {
            self.body.push(line.to_string());
        }
        None
    }
}

/// Extract the severity from `[LightGBM] [<SEVERITY>]`.
fn parse_header(line: &str) -> Option<&str> {
    let tag = line.get(..HEADER_TAG.len())?;
    if !tag.eq_ignore_ascii_case(HEADER_TAG) {
        return None;
    }
    let severity = line[HEADER_TAG.len()..]
        .trim_start()
        .strip_prefix('[')?
        .strip_suffix(']')?;
    if severity.is_empty() || severity.contains(']') {
        return None;
    }
    Some(severity)
}

// =============================================================================
// LogPipeline
// =============================================================================

/// Bounded queue plus consumer thread feeding an observer.
///
/// Dropping the pipeline closes the queue; the consumer drains what is left
/// and exits.
pub struct LogPipeline {
    sender: SyncSender<String>,
    observer: Arc<RwLock<Option<LogObserver>>>,
    dropped: AtomicU64,
}

impl LogPipeline {
    /// Start a pipeline with a [`LOG_QUEUE_CAPACITY`]-line queue.
    pub fn spawn() -> Self {
        Self::with_capacity(LOG_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let observer: Arc<RwLock<Option<LogObserver>>> = Arc::new(RwLock::new(None));

        let slot = Arc::clone(&observer);
        let spawned = thread::Builder::new()
            .name("lightgbm-log".to_string())
            .spawn(move || consume(receiver, slot));
        if let Err(err) = spawned {
            log::warn!("failed to start LightGBM log consumer, native logs will be dropped: {err}");
        }

        Self {
            sender,
            observer,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a line without blocking. Returns `false` if it was dropped.
    pub fn push(&self, line: String) -> bool {
        match self.sender.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Number of lines dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Replace the observer. Takes effect from the next record.
    ///
    /// Waits for a record that is being delivered to finish, so the old
    /// observer is never called after this returns. An observer must not
    /// set or clear observers itself; that call would never return.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        *self.observer.write() = Some(Arc::new(observer));
    }

    /// Remove the observer; records are discarded until a new one is set.
    ///
    /// Like [`set_observer`](Self::set_observer), waits out a delivery in
    /// progress.
    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }
}

fn consume(receiver: Receiver<String>, observer: Arc<RwLock<Option<LogObserver>>>) {
    let mut reassembler = LogReassembler::new();
    for line in receiver {
        let Some(record) = reassembler.feed(&line) else {
            continue;
        };
        // Held across the call so a returned clear or set is final.
        if let Some(observer) = observer.read().as_ref() {
            observer(&record);
        }
    }
}

// =============================================================================
// Process-wide pipeline
// =============================================================================

static PIPELINE: OnceLock<LogPipeline> = OnceLock::new();

/// The pipeline fed by the native library's log callback.
pub fn log_pipeline() -> &'static LogPipeline {
    PIPELINE.get_or_init(LogPipeline::spawn)
}

/// Register the observer for native log records.
///
/// May be called at any time, before or after the library is loaded, but
/// never from inside an observer.
pub fn set_log_observer<F>(observer: F)
where
    F: Fn(&LogRecord) + Send + Sync + 'static,
{
    log_pipeline().set_observer(observer);
}

/// Stop delivering native log records.
pub fn clear_log_observer() {
    log_pipeline().clear_observer();
}

/// An observer that re-emits records through the `log` facade under target
/// `lightgbm`.
pub fn forward_to_log() -> impl Fn(&LogRecord) + Send + Sync + 'static {
    |record: &LogRecord| log::log!(target: "lightgbm", record.level(), "{}", record.message)
}

unsafe extern "C" fn native_log_callback(msg: *const c_char) {
    if msg.is_null() {
        return;
    }
    let line = CStr::from_ptr(msg).to_string_lossy().into_owned();
    if !log_pipeline().push(line) {
        log::trace!("LightGBM log queue full, line dropped");
    }
}

/// Route the library's log output into the process-wide pipeline.
pub(crate) fn install(api: &Api) {
    log_pipeline();
    if let Err(err) = api.register_log_callback(native_log_callback) {
        log::warn!("failed to register LightGBM log callback: {err}");
    }
}
