use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("context lock poisoned: `{0}`")]
    Poisoned(String),
}

/// Values that can be folded together while they wait to be consumed.
pub trait Coalesce {
    /// Merges a newly notified value into the one already pending.
    fn coalesce(self, pending: Self) -> Self;
}

/// Holds at most one pending value, shared between the notifying threads and a single consumer.
/// Notifications arriving before the consumer wakes up are coalesced into the pending one.
#[derive(Debug)]
pub struct Context<T>(Arc<(Mutex<Option<T>>, Condvar)>);

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Context<T> {
    fn default() -> Self {
        Self(Arc::new((Mutex::new(None), Condvar::new())))
    }
}

impl<T> Context<T>
where
    T: Coalesce,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the value (coalescing it with any pending one) and wakes up the consumer.
    pub fn notify(&self, val: T) -> Result<(), ContextError> {
        let (lck, cvar) = &*self.0;
        let mut pending = lck
            .lock()
            .map_err(|e| ContextError::Poisoned(e.to_string()))?;
        *pending = Some(match pending.take() {
            Some(previous) => val.coalesce(previous),
            None => val,
        });
        cvar.notify_all();
        Ok(())
    }

    /// Blocks until a value is pending or the timeout elapses. Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>, ContextError> {
        let (lck, cvar) = &*self.0;
        let guard = lck
            .lock()
            .map_err(|e| ContextError::Poisoned(e.to_string()))?;
        let (mut guard, _) = cvar
            .wait_timeout_while(guard, timeout, |pending| pending.is_none())
            .map_err(|e| ContextError::Poisoned(e.to_string()))?;
        Ok(guard.take())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[derive(Debug, PartialEq)]
    enum Signal {
        Tick(u32),
        Halt,
    }

    impl Coalesce for Signal {
        fn coalesce(self, pending: Self) -> Self {
            match (self, pending) {
                (Signal::Halt, _) | (_, Signal::Halt) => Signal::Halt,
                (newest, _) => newest,
            }
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_notify_before_wait_is_not_lost() {
        let ctx: Context<Signal> = Context::new();
        ctx.notify(Signal::Tick(1)).unwrap();
        assert_eq!(Some(Signal::Tick(1)), ctx.wait_timeout(WAIT).unwrap());
    }

    #[test]
    fn test_pending_values_are_coalesced() {
        let ctx: Context<Signal> = Context::new();
        ctx.notify(Signal::Tick(1)).unwrap();
        ctx.notify(Signal::Tick(2)).unwrap();
        assert_eq!(Some(Signal::Tick(2)), ctx.wait_timeout(WAIT).unwrap());

        ctx.notify(Signal::Halt).unwrap();
        ctx.notify(Signal::Tick(3)).unwrap();
        assert_eq!(Some(Signal::Halt), ctx.wait_timeout(WAIT).unwrap());
    }

    #[test]
    fn test_wait_timeout_returns_none_without_notification() {
        let ctx: Context<Signal> = Context::new();
        let got = ctx.wait_timeout(Duration::from_millis(10)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_wait_is_woken_up_from_another_thread() {
        let ctx: Context<Signal> = Context::new();
        let notifier = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            notifier.notify(Signal::Halt).unwrap();
        });
        assert_eq!(Some(Signal::Halt), ctx.wait_timeout(WAIT).unwrap());
        handle.join().unwrap();
    }
}
