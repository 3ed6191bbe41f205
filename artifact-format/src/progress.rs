//! Progress reporting (spec.md §4.6, §5): the writer/reader send `Stage`
//! notifications and per-file byte counts to a caller-supplied observer. A
//! dropped receiver never aborts the engine — sends are best-effort, mirrored
//! on the `log`-based progress reporting the teacher uses elsewhere
//! (`info!("downloading {}...", self.url)` in `download/package.rs`),
//! generalized here into a structured, caller-observable channel instead of
//! only a log line.

use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Version,
    Manifest,
    ManifestSignature,
    Header,
    HeaderAugment,
    Data { index: usize, name: String },
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Stage(Stage),
    Bytes { index: usize, written: u64, total: Option<u64> },
}

pub trait ProgressObserver: Send {
    fn notify(&self, event: ProgressEvent);
}

/// Default observer: pays nothing, notifies nobody.
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn notify(&self, _event: ProgressEvent) {}
}

/// An observer backed by an `mpsc` channel; `notify` never blocks the
/// engine on a full or dropped receiver.
pub struct ChannelObserver {
    sender: Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = channel();
        (ChannelObserver { sender }, receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: ProgressEvent) {
        // A disconnected receiver (the caller stopped listening) is not an
        // engine failure; progress is observational only.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_observer_delivers_events_in_order() {
        let (observer, receiver) = ChannelObserver::new();
        observer.notify(ProgressEvent::Stage(Stage::Version));
        observer.notify(ProgressEvent::Stage(Stage::Header));

        assert!(matches!(receiver.recv().unwrap(), ProgressEvent::Stage(Stage::Version)));
        assert!(matches!(receiver.recv().unwrap(), ProgressEvent::Stage(Stage::Header)));
    }

    #[test]
    fn dropped_receiver_does_not_panic_on_notify() {
        let (observer, receiver) = ChannelObserver::new();
        drop(receiver);
        observer.notify(ProgressEvent::Stage(Stage::Version));
    }

    #[test]
    fn noop_observer_accepts_any_event() {
        let observer = NoopObserver;
        observer.notify(ProgressEvent::Stage(Stage::Data { index: 0, name: "update.ext4".to_string() }));
    }
}
