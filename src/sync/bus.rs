//! Drain lifecycle notices for sibling listeners.
//!
//! Mirrors the broadcast channel the web client used to tell other tabs
//! a drain started or ended, so they can hold off their own attempts and
//! refresh their views when the queue settles.

use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrainNotice {
    Started { owner: String },
    Ended { owner: String },
}

/// Fan-out channel for [`DrainNotice`] values. Receivers that were
/// dropped are pruned on the next publish.
#[derive(Default)]
pub struct NoticeBus {
    senders: Mutex<Vec<async_channel::Sender<DrainNotice>>>,
}

impl NoticeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> async_channel::Receiver<DrainNotice> {
        let (sender, receiver) = async_channel::unbounded();
        self.senders.lock().unwrap().push(sender);
        receiver
    }

    pub fn publish(&self, notice: DrainNotice) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|sender| sender.try_send(notice.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_every_live_subscriber() {
        let bus = NoticeBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(DrainNotice::Started { owner: "tab-1".into() });

        assert_eq!(
            first.try_recv().unwrap(),
            DrainNotice::Started { owner: "tab-1".into() }
        );
        assert_eq!(
            second.try_recv().unwrap(),
            DrainNotice::Started { owner: "tab-1".into() }
        );
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = NoticeBus::new();
        let receiver = bus.subscribe();
        drop(receiver);

        bus.publish(DrainNotice::Ended { owner: "tab-1".into() });
        assert!(bus.senders.lock().unwrap().is_empty());
    }
}
