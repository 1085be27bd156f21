//! CP-004: Content handles — payload variants, use budgets, deterministic release.
//!
//! A `Content` is the payload a step publishes for its consumers. It carries
//! a bounded use budget: every data access ticks the budget, and every
//! declared consumer must additionally signal `finish_usage` exactly once.
//! When the finish tally reaches the budget the handle releases its resources
//! synchronously (owned temp files deleted, buffers and caches dropped), so
//! peak disk/memory tracks the live frontier of the graph rather than the
//! whole pipeline's cumulative output.
//!
//! Consumers never mutate a handle in place; transforms always publish new
//! handles.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tempfile::TempPath;

use super::error::{StepError, UsageError};

/// Payload representation behind a handle.
enum Payload {
    /// In-memory bytes
    Bytes(Vec<u8>),
    /// In-memory structured document
    Doc(Value),
    /// File-backed, no in-memory copy. `temp` is set when the handle owns
    /// the file and must delete it at release.
    File {
        path: PathBuf,
        temp: Option<TempPath>,
    },
    /// Terminal marker for pure side-effecting steps; any access is fatal
    Empty,
    /// Post-release state
    Released,
}

struct ContentState {
    label: String,
    payload: Payload,
    allowed: u32,
    accesses: u32,
    finishes: u32,
    /// Lazy bytes rendering of a document payload
    byte_cache: Option<Vec<u8>>,
    /// Lazy parse of a bytes/file payload
    doc_cache: Option<Value>,
    /// Temp files materialized from this handle, deleted at release
    temp_files: Vec<TempPath>,
}

/// A labelled, budget-guarded content handle.
pub struct Content {
    state: Mutex<ContentState>,
}

impl Content {
    fn with_payload(payload: Payload) -> Self {
        Self {
            state: Mutex::new(ContentState {
                label: "inline".to_string(),
                payload,
                allowed: 1,
                accesses: 0,
                finishes: 0,
                byte_cache: None,
                doc_cache: None,
                temp_files: Vec::new(),
            }),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::with_payload(Payload::Bytes(bytes))
    }

    pub fn from_doc(doc: Value) -> Self {
        Self::with_payload(Payload::Doc(doc))
    }

    /// File-backed content that does not own the file (e.g. a source file).
    pub fn from_path(path: PathBuf) -> Self {
        Self::with_payload(Payload::File { path, temp: None })
    }

    /// File-backed content owning a temp file; the file is deleted when the
    /// handle releases.
    pub fn from_temp(temp: TempPath) -> Self {
        let path = temp.to_path_buf();
        Self::with_payload(Payload::File {
            path,
            temp: Some(temp),
        })
    }

    /// The empty/terminal marker.
    pub fn empty() -> Self {
        Self::with_payload(Payload::Empty)
    }

    /// Stamp the producing step's id and the declared consumer count onto
    /// the handle. Called by the scheduler before any consumer can see it.
    pub(crate) fn bind(&self, label: &str, allowed: u32) {
        let mut s = self.lock();
        s.label = label.to_string();
        s.allowed = allowed;
    }

    pub fn label(&self) -> String {
        self.lock().label.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ContentState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Render the payload as bytes. Counts one use.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StepError> {
        let mut s = self.lock();
        tick(&mut s)?;
        bytes_of(&mut s)
    }

    /// Render the payload as UTF-8 text (lossy). Counts one use.
    pub fn to_text(&self) -> Result<String, StepError> {
        let mut s = self.lock();
        tick(&mut s)?;
        let bytes = bytes_of(&mut s)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parse the payload as a structured document. Counts one use. The
    /// parse is computed lazily and cached for the handle's lifetime.
    pub fn to_doc(&self) -> Result<Value, StepError> {
        let mut s = self.lock();
        tick(&mut s)?;
        doc_of(&mut s)
    }

    /// Materialize the payload as a file path. Counts one use. File-backed
    /// payloads return their existing path; other payloads are written to a
    /// temp file owned by this handle and deleted at its release.
    pub fn to_temp_file(&self) -> Result<PathBuf, StepError> {
        let mut s = self.lock();
        tick(&mut s)?;
        if let Payload::File { path, .. } = &s.payload {
            return Ok(path.clone());
        }
        let bytes = bytes_of(&mut s)?;
        let file = tempfile::Builder::new()
            .prefix("capas-")
            .suffix(".geojson")
            .tempfile()?;
        std::fs::write(file.path(), &bytes)?;
        let temp = file.into_temp_path();
        let path = temp.to_path_buf();
        s.temp_files.push(temp);
        Ok(path)
    }

    /// Signal that one declared consumer is done with this handle, whether
    /// or not it read the data. When the tally reaches the declared consumer
    /// count, resources are released synchronously.
    pub fn finish_usage(&self) -> Result<(), UsageError> {
        let mut s = self.lock();
        if matches!(s.payload, Payload::Empty) {
            // The marker owns nothing; finishing it keeps the tally of its
            // consumers accurate without ever releasing.
            return Ok(());
        }
        if s.finishes >= s.allowed {
            return Err(UsageError::FinishExceeded {
                label: s.label.clone(),
                allowed: s.allowed,
                attempted: s.finishes + 1,
            });
        }
        s.finishes += 1;
        if s.finishes == s.allowed {
            release(&mut s);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.lock();
        let variant = match s.payload {
            Payload::Bytes(_) => "bytes",
            Payload::Doc(_) => "doc",
            Payload::File { .. } => "file",
            Payload::Empty => "empty",
            Payload::Released => "released",
        };
        write!(
            f,
            "Content({}, {}, {}/{} uses, {} finishes)",
            s.label, variant, s.accesses, s.allowed, s.finishes
        )
    }
}

fn tick(s: &mut ContentState) -> Result<(), UsageError> {
    match s.payload {
        Payload::Empty => return Err(UsageError::Empty(s.label.clone())),
        Payload::Released => return Err(UsageError::AfterRelease(s.label.clone())),
        _ => {}
    }
    if s.accesses >= s.allowed {
        return Err(UsageError::BudgetExceeded {
            label: s.label.clone(),
            allowed: s.allowed,
            attempted: s.accesses + 1,
        });
    }
    s.accesses += 1;
    Ok(())
}

fn bytes_of(s: &mut ContentState) -> Result<Vec<u8>, StepError> {
    if let Some(bytes) = &s.byte_cache {
        return Ok(bytes.clone());
    }
    let bytes = match &s.payload {
        Payload::Bytes(bytes) => return Ok(bytes.clone()),
        // File payloads stream from disk on every access; buffering them
        // would defeat the no-in-memory-copy variant.
        Payload::File { path, .. } => return Ok(std::fs::read(path)?),
        Payload::Doc(doc) => serde_json::to_vec(doc)?,
        Payload::Empty => return Err(UsageError::Empty(s.label.clone()).into()),
        Payload::Released => return Err(UsageError::AfterRelease(s.label.clone()).into()),
    };
    s.byte_cache = Some(bytes.clone());
    Ok(bytes)
}

fn doc_of(s: &mut ContentState) -> Result<Value, StepError> {
    if let Some(doc) = &s.doc_cache {
        return Ok(doc.clone());
    }
    let doc = match &s.payload {
        Payload::Doc(doc) => return Ok(doc.clone()),
        Payload::Bytes(bytes) => serde_json::from_slice(bytes)?,
        Payload::File { path, .. } => serde_json::from_slice(&std::fs::read(path)?)?,
        Payload::Empty => return Err(UsageError::Empty(s.label.clone()).into()),
        Payload::Released => return Err(UsageError::AfterRelease(s.label.clone()).into()),
    };
    s.doc_cache = Some(doc.clone());
    Ok(doc)
}

fn release(s: &mut ContentState) {
    // Dropping TempPath values deletes the files right here, not at some
    // later collection point.
    s.temp_files.clear();
    s.byte_cache = None;
    s.doc_cache = None;
    s.payload = Payload::Released;
}
