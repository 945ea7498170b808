use super::SessionEvent;

/// Receives session events on the single consumer that drains the event queue.
///
/// Observers never run on a worker task, so they may freely touch state owned
/// by the consumer.
pub trait SessionObserver: Send {
    fn on_event(&mut self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: FnMut(&SessionEvent) + Send,
{
    fn on_event(&mut self, event: &SessionEvent) {
        self(event)
    }
}
