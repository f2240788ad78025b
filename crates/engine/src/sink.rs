//! Event sinks.

use std::io::Write;
use sweep_core::{EngineEvent, EventSink};
use tokio::sync::mpsc;
use tracing::warn;

/// Writes each event as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
    failed: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            failed: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &EngineEvent) -> sweep_core::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: EngineEvent) {
        match self.write_event(&event) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                warn!(position_id = event.position_id(), error = %e, "failed to write event");
            }
        }
    }
}

/// Forwards events to an async consumer. Used by the live runner, one clone per symbol task.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: EngineEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!(position_id = e.0.position_id(), "event receiver dropped");
        }
    }
}
