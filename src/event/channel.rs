use crossbeam::channel::{unbounded, Receiver, RecvError, SendError, Sender};

pub struct EventConsumer<E>(Receiver<E>);
pub struct EventPublisher<E>(Sender<E>);

pub fn pub_sub<E>() -> (EventPublisher<E>, EventConsumer<E>) {
    let (s, r) = unbounded();
    (EventPublisher(s), EventConsumer(r))
}

impl<E> EventPublisher<E> {
    pub fn publish(&self, event: E) -> Result<(), SendError<E>> {
        self.0.send(event)
    }
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        EventPublisher(self.0.clone())
    }
}

impl<E> EventConsumer<E> {
    /// Blocks until an event arrives. Fails once every publisher has been dropped.
    pub fn consume(&self) -> Result<E, RecvError> {
        self.0.recv()
    }
}

impl<E> AsRef<Receiver<E>> for EventConsumer<E> {
    fn as_ref(&self) -> &Receiver<E> {
        &self.0
    }
}
