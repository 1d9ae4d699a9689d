//! Run events: monitor callbacks serialized off the worker threads.
//!
//! The engine invokes the monitor from arbitrary workers; the CLI converts
//! each callback into a plain [`Event`] value and ships it over a crossbeam
//! channel, bridged onto the Tokio side by a dedicated forwarding thread.
//! Rendering happens in one async task, so output never interleaves.

use std::{path::Path, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, unbounded};
use quarry_engine::{Data, Error, Manager, Monitor, Target, Unit};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Longest payload preview rendered for data events.
const PREVIEW_LEN: usize = 64;

/// One observable event from a run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A unit produced an artifact on disk.
    Artifact {
        /// Producing unit name.
        unit: String,
        /// Artifact path.
        path: String,
    },
    /// A unit produced result data.
    Data {
        /// Producing unit name.
        unit: String,
        /// Total payload size in bytes.
        bytes: usize,
        /// Shortened, printable rendition of the payload.
        preview: String,
    },
    /// A flag was found.
    Flag {
        /// Producing unit name.
        unit: String,
        /// The matched flag text.
        flag: String,
    },
    /// A unit failed while enumerating or evaluating.
    Exception {
        /// Failing unit name.
        unit: String,
        /// Rendered error.
        error: String,
    },
    /// Recursion was dropped at the depth limit.
    DepthLimit {
        /// Unit whose recursion was dropped.
        unit: String,
        /// Depth of that unit's target.
        depth: u32,
    },
    /// The run finished.
    Completion {
        /// Whether the run ended by timeout.
        did_timeout: bool,
    },
}

impl Event {
    /// Human-readable one-line rendition.
    pub fn render(&self) -> String {
        match self {
            Self::Artifact { unit, path } => format!("[artifact] {} ({})", path, unit),
            Self::Data {
                unit,
                bytes,
                preview,
            } => format!("[data] {} bytes from {}: {}", bytes, unit, preview),
            Self::Flag { unit, flag } => format!("[flag] {} ({})", flag, unit),
            Self::Exception { unit, error } => format!("[error] {}: {}", unit, error),
            Self::DepthLimit { unit, depth } => {
                format!("[depth] recursion from {} dropped at depth {}", unit, depth)
            }
            Self::Completion { did_timeout } => {
                if *did_timeout {
                    "[done] timed out".to_string()
                } else {
                    "[done] evaluation drained".to_string()
                }
            }
        }
    }
}

/// Flatten a registration payload into a size and a printable preview.
fn summarize(data: &Data) -> (usize, String) {
    fn collect(data: &Data, out: &mut Vec<u8>) {
        match data {
            Data::Bytes(b) => out.extend_from_slice(b),
            Data::Text(s) => out.extend_from_slice(s.as_bytes()),
            Data::Items(items) => {
                for item in items {
                    collect(item, out);
                }
            }
        }
    }

    let mut bytes = Vec::new();
    collect(data, &mut bytes);
    let total = bytes.len();

    let mut preview: String = String::from_utf8_lossy(&bytes)
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(PREVIEW_LEN)
        .collect();
    if total > preview.len() {
        preview.push('…');
    }
    (total, preview)
}

/// A monitor that forwards every callback as an [`Event`].
pub struct ChannelMonitor {
    tx: Sender<Event>,
}

impl ChannelMonitor {
    /// Create a monitor plus the receiving end of its event stream.
    pub fn new() -> (Arc<Self>, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: Event) {
        // The receiver disappearing just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl Monitor for ChannelMonitor {
    fn on_artifact(&self, _manager: &Manager, unit: &Arc<dyn Unit>, path: &Path) {
        self.send(Event::Artifact {
            unit: unit.name().to_string(),
            path: path.to_string_lossy().into_owned(),
        });
    }

    fn on_data(&self, _manager: &Manager, unit: &Arc<dyn Unit>, data: &Data) {
        let (bytes, preview) = summarize(data);
        self.send(Event::Data {
            unit: unit.name().to_string(),
            bytes,
            preview,
        });
    }

    fn on_flag(&self, _manager: &Manager, unit: &Arc<dyn Unit>, flag: &str) {
        self.send(Event::Flag {
            unit: unit.name().to_string(),
            flag: flag.to_string(),
        });
    }

    fn on_exception(&self, _manager: &Manager, unit: &Arc<dyn Unit>, error: &Error) {
        self.send(Event::Exception {
            unit: unit.name().to_string(),
            error: error.to_string(),
        });
    }

    fn on_depth_limit(&self, _manager: &Manager, target: &Arc<Target>, parent: &Arc<dyn Unit>) {
        self.send(Event::DepthLimit {
            unit: parent.name().to_string(),
            depth: target.depth(),
        });
    }

    fn on_completion(&self, _manager: &Manager, did_timeout: bool) {
        self.send(Event::Completion { did_timeout });
    }
}

/// Bridge the crossbeam event channel to a Tokio unbounded channel using a
/// dedicated OS thread.
///
/// The bridge forwards until either side closes: if the Tokio receiver is
/// dropped, forwarding fails and the thread exits; once all senders are
/// gone, the Tokio receiver closes after the remaining items are observed.
pub fn bridge_to_tokio(rx: Receiver<Event>) -> UnboundedReceiver<Event> {
    let (tx_tokio, rx_tokio) = mpsc::unbounded_channel();

    thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            if tx_tokio.send(event).is_err() {
                break;
            }
        }
    });

    rx_tokio
}
