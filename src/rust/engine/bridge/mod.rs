//! Control channel between the real-time processor and its controller.
//!
//! Inbound: `init` messages carrying a compiled module. Outbound: ready,
//! error, log and perf events. Posting never blocks; events are delivered
//! in send order and never throttled.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::engine::runtime::CompiledModule;

/// Message sent from the controller to the processor.
#[derive(Debug)]
pub enum ControlMessage {
    Init { module: CompiledModule },
}

/// Event sent from the processor back to the controller.
///
/// Serializes to the wire shape consumed by the editor front end, e.g.
/// `{"type":"perf","avgMs":0.12,"maxMs":0.4,"bufferSize":128,"sampleRate":44100}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProcessorEvent {
    Ready,
    Error {
        message: String,
    },
    #[serde(rename = "stdout", alias = "log")]
    Log {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Perf {
        avg_ms: f64,
        max_ms: f64,
        buffer_size: usize,
        sample_rate: u32,
    },
}

impl ProcessorEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ProcessorEvent::Error {
            message: message.into(),
        }
    }

    pub fn log(text: impl Into<String>) -> Self {
        ProcessorEvent::Log { text: text.into() }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string())
    }
}

/// Processor-side handle for posting events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<ProcessorEvent>,
}

impl EventSender {
    /// Fire-and-forget post. A closed controller side is not an error for
    /// the processor; the event is simply dropped.
    pub fn post(&self, event: ProcessorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Controller-side receiver of processor events.
pub struct EventReceiver {
    rx: UnboundedReceiver<ProcessorEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<ProcessorEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProcessorEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains every event currently queued without waiting.
    pub fn drain(&mut self) -> Vec<ProcessorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Controller-side handle for sending `init` messages.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: UnboundedSender<ControlMessage>,
}

impl ControlSender {
    pub fn send_init(&self, module: CompiledModule) -> bool {
        self.tx.send(ControlMessage::Init { module }).is_ok()
    }
}

pub struct ControlReceiver {
    rx: UnboundedReceiver<ControlMessage>,
}

impl ControlReceiver {
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.rx.recv().await
    }
}

pub fn control_channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, ControlReceiver { rx })
}

#[cfg(test)]
#[path = "test_bridge.rs"]
mod tests;
