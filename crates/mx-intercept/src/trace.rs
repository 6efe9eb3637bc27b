//! Scoped debug trace of outbound calls.
//!
//! One `CallTrace` per logical call scope, passed explicitly down the
//! call chain rather than looked up from ambient context. Entries are
//! appended at call issuance, so calls that fail before a response
//! arrives still leave a correlatable record.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::correlation::CallId;

/// Terminal state of one traced call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// Issued, response not yet observed.
    Pending,
    /// A response arrived.
    Completed { status: u16, response_excerpt: String },
    /// The call failed before a response arrived.
    Failed { error: String },
}

/// One record per outbound call, in issuance order.
#[derive(Clone, Debug)]
pub struct CallEntry {
    pub call_id: String,
    pub outcome: CallOutcome,
    pub latency_ms: Option<u64>,
}

/// Push-only trace scope.
///
/// Entries are never removed or replaced; completing a call fills the
/// outcome fields of the entry appended at issuance. Snapshots remain
/// readable after the owning scope has finished.
#[derive(Default)]
pub struct CallTrace {
    entries: Arc<Mutex<Vec<CallEntry>>>,
}

impl CallTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for a call being issued right now.
    ///
    /// The returned handle fills in the outcome later; the identifier
    /// is durable in the trace from this point on.
    pub fn begin(&self, call_id: &CallId) -> EntryHandle {
        let mut entries = self.lock();
        entries.push(CallEntry {
            call_id: call_id.as_str().to_string(),
            outcome: CallOutcome::Pending,
            latency_ms: None,
        });
        EntryHandle {
            entries: Arc::clone(&self.entries),
            index: entries.len() - 1,
        }
    }

    /// Ordered snapshot of everything collected so far.
    pub fn entries(&self) -> Vec<CallEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Write-once handle to the entry appended by [`CallTrace::begin`].
pub struct EntryHandle {
    entries: Arc<Mutex<Vec<CallEntry>>>,
    index: usize,
}

impl EntryHandle {
    /// Record a received response.
    pub fn complete(self, status: u16, response_excerpt: &str, latency: Duration) {
        self.fill(
            CallOutcome::Completed {
                status,
                response_excerpt: response_excerpt.to_string(),
            },
            latency,
        );
    }

    /// Record a failure that produced no response.
    pub fn fail(self, error: &str, latency: Duration) {
        self.fill(
            CallOutcome::Failed {
                error: error.to_string(),
            },
            latency,
        );
    }

    fn fill(self, outcome: CallOutcome, latency: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(self.index) {
            entry.outcome = outcome;
            entry.latency_ms = Some(latency.as_millis() as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_recorded_at_issuance() {
        let trace = CallTrace::new();
        let id = CallId::mint();
        let _handle = trace.begin(&id);

        // Visible before any completion.
        let entries = trace.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].call_id, id.as_str());
        assert_eq!(entries[0].outcome, CallOutcome::Pending);
    }

    #[test]
    fn completion_fills_the_same_entry() {
        let trace = CallTrace::new();
        let handle = trace.begin(&CallId::mint());
        handle.complete(200, "pong", Duration::from_millis(12));

        let entries = trace.entries();
        assert_eq!(entries.len(), 1, "completion must not append a new entry");
        assert_eq!(
            entries[0].outcome,
            CallOutcome::Completed {
                status: 200,
                response_excerpt: "pong".to_string()
            }
        );
        assert_eq!(entries[0].latency_ms, Some(12));
    }

    #[test]
    fn entries_keep_issuance_order() {
        let trace = CallTrace::new();
        let first = CallId::mint();
        let second = CallId::mint();
        let h1 = trace.begin(&first);
        let h2 = trace.begin(&second);
        // Completion order reversed on purpose.
        h2.fail("refused", Duration::from_millis(1));
        h1.complete(200, "", Duration::from_millis(2));

        let entries = trace.entries();
        assert_eq!(entries[0].call_id, first.as_str());
        assert_eq!(entries[1].call_id, second.as_str());
    }

    #[test]
    fn snapshot_survives_the_issuing_scope() {
        let trace = CallTrace::new();
        {
            let handle = trace.begin(&CallId::mint());
            handle.fail("timed out", Duration::from_secs(1));
        }
        assert_eq!(trace.entries().len(), 1);
        assert!(matches!(
            trace.entries()[0].outcome,
            CallOutcome::Failed { .. }
        ));
    }
}
