//! In-flight transaction tracking with one-shot timeouts.
//!
//! An owned table of pending entries, each holding the send callback and
//! the timer that will expire it. Exactly one of resolution or expiry
//! fires per transaction; both are no-ops after the first. Callbacks run
//! outside the table lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::Error;

/// Field map delivered to a send callback on acknowledgement, already
/// stripped of the reserved protocol keys.
pub type AckFields = HashMap<String, String>;

/// Outcome delivered to a send callback: acknowledgement fields, or the
/// transport/timeout failure.
pub type AckResult = std::result::Result<AckFields, Error>;

/// One-shot callback attached to a send call.
pub type AckCallback = Box<dyn FnOnce(AckResult) + Send>;

/// A transaction awaiting acknowledgement.
struct Pending {
    /// Fired exactly once, on ack, timeout, or transport failure.
    callback: AckCallback,
    /// Timeout task; aborted on resolution. `None` only in the window
    /// between insertion and arming.
    timer: Option<JoinHandle<()>>,
}

/// Table of transactions awaiting acknowledgement.
#[derive(Clone)]
pub(crate) struct TransactionRegistry {
    inner: Arc<Mutex<HashMap<u64, Pending>>>,
}

impl TransactionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers `callback` for `tid` and arms its one-shot timeout.
    pub(crate) fn register(&self, tid: u64, callback: AckCallback, timeout: Duration) {
        {
            let Ok(mut table) = self.inner.lock() else {
                return;
            };
            table.insert(
                tid,
                Pending {
                    callback,
                    timer: None,
                },
            );
        }

        let registry = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            registry.expire(tid, timeout);
        });

        let Ok(mut table) = self.inner.lock() else {
            timer.abort();
            return;
        };
        match table.get_mut(&tid) {
            Some(pending) => pending.timer = Some(timer),
            // Resolved between insertion and arming; the timer must not fire.
            None => timer.abort(),
        }
    }

    /// Resolves `tid` with acknowledgement fields, cancelling its timer
    /// and firing the callback once.
    ///
    /// Returns `false` when no matching entry exists — a duplicate ack,
    /// or an ack for an already-expired transaction — which callers treat
    /// as a silent drop.
    pub(crate) fn resolve(&self, tid: u64, mut fields: AckFields) -> bool {
        let Some(pending) = self.take(tid) else {
            return false;
        };
        if let Some(timer) = pending.timer {
            timer.abort();
        }
        crossway_proto::strip_reserved(&mut fields);
        (pending.callback)(Ok(fields));
        true
    }

    /// Fails `tid` through its callback, for delivery errors discovered
    /// after registration.
    pub(crate) fn fail(&self, tid: u64, error: Error) {
        let Some(pending) = self.take(tid) else {
            return;
        };
        if let Some(timer) = pending.timer {
            timer.abort();
        }
        (pending.callback)(Err(error));
    }

    /// Timer path: fails `tid` with a timeout if still pending.
    fn expire(&self, tid: u64, timeout: Duration) {
        let Some(pending) = self.take(tid) else {
            // Resolution raced ahead; nothing to do.
            return;
        };
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        (pending.callback)(Err(Error::Timeout { tid, timeout_ms }));
    }

    /// Removes and returns the entry for `tid`.
    fn take(&self, tid: u64) -> Option<Pending> {
        let Ok(mut table) = self.inner.lock() else {
            return None;
        };
        table.remove(&tid)
    }
}
