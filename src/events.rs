//! Structured operation events
//!
//! Every pull, push, skip, error and archive outcome is reported as an
//! [`Event`]: a level, a timestamp, a message key such as `pull` or
//! `replay_archive_complete`, and an open set of JSON fields. Events go to
//! an [`EventSink`]; the binary writes them as JSON lines into a daily log
//! file and mirrors them to `tracing`.
//!
//! ```rust
//! use savesync::events::{Event, EventSink, MemorySink};
//!
//! let sink = MemorySink::new();
//! sink.record(Event::info("pull").field("title", "th08").field("copied", true));
//! assert_eq!(sink.messages(), vec!["pull".to_string()]);
//! ```

use crate::clock::Clock;
use crate::error::Result;
use crate::utils::ensure_dir;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// One structured record
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub level: EventLevel,
    pub time: DateTime<Utc>,
    /// Message key
    pub msg: String,
    pub fields: Map<String, Value>,
}

impl Event {
    /// Create an event stamped with the current system time
    pub fn new(level: EventLevel, msg: impl Into<String>) -> Self {
        Self {
            level,
            time: Utc::now(),
            msg: msg.into(),
            fields: Map::new(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, msg)
    }

    pub fn warn(msg: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, msg)
    }

    /// Override the timestamp
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Add a field
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Add a path field rendered with `Path::display`
    pub fn path(self, key: &str, path: &Path) -> Self {
        self.field(key, path.display().to_string())
    }

    /// Field value as a string, if present and a string
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Destination for events
pub trait EventSink: Send + Sync {
    /// Deliver an event
    fn emit(&self, event: &Event) -> Result<()>;

    /// Deliver an event, downgrading a delivery failure to a warning
    fn record(&self, event: Event) {
        if let Err(e) = self.emit(&event) {
            warn!("Failed to record event {}: {}", event.msg, e);
        }
    }
}

/// Appends events as JSON lines to `<log_root>/<YYYY-MM-DD>.log`
///
/// Each line carries `level`, `time`, `msg`, an `op_id` identifying the run
/// that produced it, and the event's fields flattened beside them.
pub struct JsonLinesSink {
    log_root: PathBuf,
    clock: Arc<dyn Clock>,
    op_id: Uuid,
}

#[derive(Serialize)]
struct LogLine<'a> {
    level: EventLevel,
    time: &'a DateTime<Utc>,
    msg: &'a str,
    op_id: &'a Uuid,
    #[serde(flatten)]
    fields: &'a Map<String, Value>,
}

impl JsonLinesSink {
    /// Create a sink writing under `log_root`, creating it if missing
    pub fn new(log_root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let log_root = log_root.into();
        ensure_dir(&log_root)?;
        Ok(Self {
            log_root,
            clock,
            op_id: Uuid::new_v4(),
        })
    }

    /// Identifier stamped on every line written by this sink
    pub fn op_id(&self) -> Uuid {
        self.op_id
    }

    /// Log file that events are written to today
    pub fn current_file(&self) -> PathBuf {
        let day = self.clock.now().format("%Y-%m-%d");
        self.log_root.join(format!("{}.log", day))
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &Event) -> Result<()> {
        let mut fields = event.fields.clone();
        for reserved in ["level", "time", "msg", "op_id"] {
            fields.remove(reserved);
        }

        let line = LogLine {
            level: event.level,
            time: &event.time,
            msg: &event.msg,
            op_id: &self.op_id,
            fields: &fields,
        };

        let mut data = serde_json::to_vec(&line)?;
        data.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_file())?;
        file.write_all(&data)?;
        Ok(())
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) -> Result<()> {
        let fields = Value::Object(event.fields.clone());
        match event.level {
            EventLevel::Info => info!(event = %event.msg, fields = %fields),
            EventLevel::Warn => warn!(event = %event.msg, fields = %fields),
            EventLevel::Error => error!(event = %event.msg, fields = %fields),
        }
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Message keys of all events recorded so far
    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.msg).collect()
    }

    /// Events with the given message key
    pub fn find(&self, msg: &str) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.msg == msg).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

/// Forwards every event to several sinks
///
/// Delivery continues past a failing sink; the first failure is returned.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &Event) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
