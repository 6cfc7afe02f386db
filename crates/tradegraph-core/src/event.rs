use tokio::sync::mpsc;

/// What part of the context changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Cache,
    Config,
    Report,
    Log,
}

/// Payload-free change notification; observers re-read what they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextEvent {
    pub kind: UpdateKind,
}

/// Sending half of the context change channel.
///
/// Notifications never block the pipeline: when the channel is full the event
/// is dropped, which loses nothing since events carry no state.
#[derive(Debug, Clone)]
pub struct UpdateNotifier {
    tx: mpsc::Sender<ContextEvent>,
}

impl UpdateNotifier {
    /// Create a bounded notifier and its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ContextEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn notify(&self, kind: UpdateKind) {
        // Full or closed channels are both fine to ignore
        let _ = self.tx.try_send(ContextEvent { kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_delivers_event() {
        let (notifier, mut rx) = UpdateNotifier::channel(4);
        notifier.notify(UpdateKind::Log);
        assert_eq!(rx.try_recv().unwrap().kind, UpdateKind::Log);
    }

    #[test]
    fn test_notify_drops_when_full() {
        let (notifier, mut rx) = UpdateNotifier::channel(1);
        notifier.notify(UpdateKind::Cache);
        notifier.notify(UpdateKind::Report);
        assert_eq!(rx.try_recv().unwrap().kind, UpdateKind::Cache);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notify_after_receiver_dropped() {
        let (notifier, rx) = UpdateNotifier::channel(1);
        drop(rx);
        notifier.notify(UpdateKind::Config);
    }
}
