//! Start barrier shared by the simulation, device and frontend threads.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::{SimError, SimResult};

/// One-shot event: threads block in [`StartEvent::wait`] until
/// [`StartEvent::set`] is called. A new event is created for every run.
#[derive(Debug, Default)]
pub struct StartEvent {
    set: Mutex<bool>,
    cv: Condvar,
}

impl StartEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        // Waking waiters matters more than the flag when poisoned.
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        *set = true;
        self.cv.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.set.lock().map(|s| *s).unwrap_or(true)
    }

    pub fn wait(&self) -> SimResult<()> {
        let guard = self.set.lock().map_err(|_| SimError::LockPoisoned)?;
        let _set = self
            .cv
            .wait_while(guard, |set| !*set)
            .map_err(|_| SimError::LockPoisoned)?;
        Ok(())
    }

    /// Wait at most `timeout`; returns whether the event is set.
    pub fn wait_timeout(&self, timeout: Duration) -> SimResult<bool> {
        let guard = self.set.lock().map_err(|_| SimError::LockPoisoned)?;
        let (set, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |set| !*set)
            .map_err(|_| SimError::LockPoisoned)?;
        Ok(*set)
    }
}
