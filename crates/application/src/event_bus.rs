use tokio::sync::mpsc;
use tracing::{trace, warn};

use domain::{SessionEvent, SessionObserver};

/// Producer/consumer hand-off between session workers and the single
/// foreground consumer.
///
/// Workers hold an [`EventSink`] and never call observers themselves; the
/// owner of the [`EventQueue`] drains it and fans each event out to the
/// attached observers in emission order.
pub struct EventBus;

impl EventBus {
    pub fn channel() -> (EventSink, EventQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSink { tx },
            EventQueue {
                rx,
                observers: Vec::new(),
            },
        )
    }
}

/// Cloneable producer side, handed to every worker
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn emit(&self, event: SessionEvent) {
        trace!(kind = event.kind(), "emit");
        if let Err(e) = self.tx.send(event) {
            warn!(kind = e.0.kind(), "Event queue closed, dropping event");
        }
    }
}

/// Consumer side; observers only ever run on the task that owns this
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl EventQueue {
    pub fn attach(&mut self, observer: impl SessionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Next queued event without waiting
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        let event = self.rx.try_recv().ok()?;
        self.dispatch(&event);
        Some(event)
    }

    /// Wait for the next event. `None` once every sink is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        let event = self.rx.recv().await?;
        self.dispatch(&event);
        Some(event)
    }

    /// Everything queued so far, in emission order
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }

    fn dispatch(&mut self, event: &SessionEvent) {
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }
}
