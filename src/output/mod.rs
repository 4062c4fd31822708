//! Output module
//!
//! Writes the SCHEMA / RECORD / STATE message stream.
//!
//! # Overview
//!
//! The orchestrator hands every message to a `RecordSink`:
//! - `JsonLinesSink` - newline-delimited JSON on any writer (stdout in the CLI)
//! - `MemorySink` - collects messages in memory

mod types;

pub use types::Message;

use crate::error::{Error, Result};
use crate::types::Record;
use std::io::{self, BufWriter, Stdout, Write};

/// Destination of output messages
pub trait RecordSink: Send {
    /// Write one message
    fn write(&mut self, message: &Message) -> Result<()>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Newline-delimited JSON writer
///
/// Flushes after every STATE message so that everything a checkpoint
/// covers has left the process before the next fetch.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    pretty: bool,
}

impl JsonLinesSink<BufWriter<Stdout>> {
    /// Write to standard output
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(io::stdout()))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    /// Pretty-print each message
    #[must_use]
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Consume the sink, returning the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write(&mut self, message: &Message) -> Result<()> {
        let line = if self.pretty {
            serde_json::to_string_pretty(message)?
        } else {
            serde_json::to_string(message)?
        };
        writeln!(self.writer, "{line}")
            .map_err(|e| Error::output(format!("Failed to write message: {e}")))?;

        if message.is_state() {
            RecordSink::flush(self)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::output(format!("Failed to flush output: {e}")))
    }
}

/// Sink collecting messages in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Vec<Message>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in write order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Records written for `stream`, in order
    pub fn records(&self, stream: &str) -> Vec<&Record> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Record {
                    stream: s, record, ..
                } if s == stream => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Number of records across all streams
    pub fn record_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_record()).count()
    }

    /// Streams that received a SCHEMA message, in order
    pub fn schema_streams(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Schema { stream, .. } => Some(stream.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The last STATE message value
    pub fn last_state(&self) -> Option<&serde_json::Value> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::State { value } => Some(value),
            _ => None,
        })
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, message: &Message) -> Result<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}
