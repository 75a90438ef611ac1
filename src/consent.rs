use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Unknown,
    Granted,
    Denied,
}

impl ConsentDecision {
    /// `choice=true` grants; an absent or malformed value denies.
    pub fn from_choice(value: Option<&str>) -> Self {
        match value {
            Some("true") => ConsentDecision::Granted,
            _ => ConsentDecision::Denied,
        }
    }

    pub fn is_decided(self) -> bool {
        self != ConsentDecision::Unknown
    }
}

/// Single-assignment decision shared between the consent server and the
/// waiting orchestrator. The first recorded decision wins; later writes are
/// ignored.
#[derive(Debug, Clone)]
pub struct ConsentCell {
    shared: Arc<(Mutex<ConsentDecision>, Condvar)>,
}

impl Default for ConsentCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentCell {
    pub fn new() -> Self {
        Self {
            shared: Arc::new((Mutex::new(ConsentDecision::Unknown), Condvar::new())),
        }
    }

    /// Returns true when this call set the decision.
    pub fn record(&self, decision: ConsentDecision) -> bool {
        if !decision.is_decided() {
            return false;
        }
        let (lock, condvar) = &*self.shared;
        let mut current = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.is_decided() {
            return false;
        }
        *current = decision;
        condvar.notify_all();
        true
    }

    pub fn current(&self) -> ConsentDecision {
        let (lock, _) = &*self.shared;
        match lock.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Blocks until a decision is recorded or `timeout` elapses. Returns
    /// `Unknown` on timeout.
    pub fn wait(&self, timeout: Duration) -> ConsentDecision {
        let (lock, condvar) = &*self.shared;
        let guard = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match condvar.wait_timeout_while(guard, timeout, |decision| !decision.is_decided()) {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}
