//! An append-only log of JSON patches.
//!
//! Event 0 adds the whole initial document; every later event patches the
//! document resolved so far. The current document is what all events produce
//! when applied in order.

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use serde_json::{de::IoRead, Deserializer, StreamDeserializer, Value};
use std::{
    fs::{File, OpenOptions},
    io::{self, Seek as _, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Event {
    pub index: u64,
    pub meta: EventMeta,
    pub patch: json_patch::Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct EventMeta {
    pub time: String,
    #[serde(flatten)]
    pub other_fields: Value,
}

pub struct EventStream<'a, R: io::Read> {
    iter: StreamDeserializer<'a, IoRead<R>, Event>,
    /// The validated first event, handed out before the rest of the stream.
    first_event: Option<Event>,
}

impl<'a, R: io::Read> EventStream<'a, R> {
    pub fn open_from_reader(reader: R) -> Result<EventStream<'a, R>> {
        let deserializer = Deserializer::from_reader(reader);
        let mut iter = deserializer.into_iter();
        let first_event = match iter.next() {
            Some(Ok(ev @ Event { index, .. })) => {
                if index != 0 {
                    bail!("Expected initial event with index 0, got {}", index);
                }
                ev
            }
            Some(Err(e)) => bail!("Event log invalid: error parsing initial event: {}", e),
            None => bail!("Event log invalid: no initial event"),
        };
        Ok(EventStream {
            iter,
            first_event: Some(first_event),
        })
    }
}

impl<'a, R: io::Read> Iterator for EventStream<'a, R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first_event.is_some() {
            self.first_event.take().map(Ok)
        } else {
            self.iter.next().map(|r| r.map_err(Into::into))
        }
    }
}

pub fn apply_event(document: &mut Value, event: &Event) -> Result<()> {
    json_patch::patch(document, event.patch.0.as_slice())
        .with_context(|| format!("Could not apply event {}", event.index))
}

/// Apply `events` in order, returning the number of events applied.
pub fn apply_events(
    document: &mut Value,
    events: impl Iterator<Item = Result<Event>>,
) -> Result<u64> {
    let mut expected = 0;
    for event in events {
        let event = event?;
        if event.index != expected {
            bail!(
                "Event log out of order: expected event {}, got {}",
                expected,
                event.index
            );
        }
        apply_event(document, &event)?;
        expected += 1;
    }
    Ok(expected)
}

/// An open event log and the document it resolves to.
pub struct Journal {
    path: PathBuf,
    file: Arc<File>,
    locking: fd_lock::RwLock<Arc<File>>,
    expected_size: Option<u64>,
    document: Value,
    next_index: u64,
}

impl Journal {
    /// Create a new log at `path` holding `document`. Fails if the file
    /// exists.
    pub fn create<P: AsRef<Path>>(path: P, document: Value) -> Result<Journal> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Could not create {}", path.display()))?;
        let mut journal = Journal::from_file(path, file, serde_json::json!({}), 0);
        let patch = json_patch::Patch(vec![json_patch::PatchOperation::Add(
            json_patch::AddOperation {
                path: "".parse()?,
                value: document.clone(),
            },
        )]);
        journal.append(patch, serde_json::json!({}))?;
        journal.document = document;
        Ok(journal)
    }

    /// Open an existing log and replay it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Journal> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Could not open {}", path.display()))?;
        let mut journal = Journal::from_file(path, file, serde_json::json!({}), 0);
        let (document, count) = {
            let guard = journal.locking.read()?;
            let events = EventStream::open_from_reader(io::BufReader::new(&**guard))?;
            let mut document = serde_json::json!({});
            let count = apply_events(&mut document, events)
                .with_context(|| format!("Could not read {}", path.display()))?;
            (document, count)
        };
        debug!(path = %path.display(), events = count, "replayed event log");
        journal.document = document;
        journal.next_index = count;
        Ok(journal)
    }

    /// Open the log at `path`, creating it with `initial` if it does not
    /// exist yet.
    pub fn open_or_create<P: AsRef<Path>>(path: P, initial: impl FnOnce() -> Value) -> Result<Journal> {
        if path.as_ref().exists() {
            Journal::open(path)
        } else {
            Journal::create(path, initial())
        }
    }

    fn from_file(path: &Path, file: File, document: Value, next_index: u64) -> Journal {
        let file = Arc::new(file);
        let locking = fd_lock::RwLock::new(file.clone());
        Journal {
            path: path.to_path_buf(),
            file,
            locking,
            expected_size: None,
            document,
            next_index,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Record `document` as the new current document. Appends one event with
    /// the difference, or nothing if there is none; returns whether an event
    /// was written.
    pub fn record(&mut self, document: Value, meta: Value) -> Result<bool> {
        let patch = json_patch::diff(&self.document, &document);
        if patch.0.is_empty() {
            return Ok(false);
        }
        self.append(patch, meta)?;
        self.document = document;
        Ok(true)
    }

    fn append(&mut self, patch: json_patch::Patch, meta: Value) -> Result<()> {
        let event = Event {
            index: self.next_index,
            meta: EventMeta {
                time: Utc::now().to_rfc3339(),
                other_fields: meta,
            },
            patch,
        };
        let lock_guard = self.locking.write()?;
        let pos = (&*self.file).seek(io::SeekFrom::End(0))?;
        match self.expected_size {
            None => self.expected_size = Some(pos),
            Some(expected_size) => {
                if pos != expected_size {
                    warn!(
                        path = %self.path.display(),
                        "Detected concurrent writing. Foreign bytes: [{}..{})",
                        expected_size,
                        pos
                    );
                }
            }
        }
        let mut writer = io::BufWriter::new(&*self.file);
        // Pretty, so that people can read the history.
        serde_json::to_writer_pretty(&mut writer, &event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        self.expected_size = Some((&*self.file).stream_position()?);
        drop(lock_guard);
        self.next_index += 1;
        Ok(())
    }
}
