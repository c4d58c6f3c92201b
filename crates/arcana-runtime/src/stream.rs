//! Streaming reading events.
//!
//! Progress is exposed as a finite typed event sequence over a channel:
//! phases, then text chunks of the accepted narrative, then the terminal
//! reading. Streaming is decoupled from gating: chunks are only emitted
//! after the structural gate accepted the fully assembled text, and a
//! consumer dropping its receiver simply stops delivery without touching
//! the pipeline. Canceling the job itself goes through the job handle.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use arcana_core::Reading;

/// Pipeline phase markers, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadingPhase {
    Analyzing,
    Drafting,
    Polishing,
}

/// One streaming event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadingEvent {
    Phase { phase: ReadingPhase },
    Chunk { text: String },
    Done { reading: Box<Reading> },
}

/// Best-effort sender side of the event stream.
///
/// Sends are non-blocking; a full or closed channel drops the event. The
/// reading itself never depends on whether anyone is listening.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ReadingEvent>,
}

impl EventSender {
    /// Create a bounded event channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReadingEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn phase(&self, phase: ReadingPhase) {
        let _ = self.tx.try_send(ReadingEvent::Phase { phase });
    }

    pub fn chunk(&self, text: impl Into<String>) {
        let _ = self.tx.try_send(ReadingEvent::Chunk { text: text.into() });
    }

    pub fn done(&self, reading: Reading) {
        let _ = self.tx.try_send(ReadingEvent::Done {
            reading: Box::new(reading),
        });
    }
}
