//! Corruption reporting.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::DropReason;

/// Receives notice of every region the log reader skips.
pub trait Reporter: Send {
    /// `bytes` is the approximate number of bytes dropped.
    fn corruption(&mut self, bytes: u64, reason: &DropReason);
}

impl<F> Reporter for F
where
    F: FnMut(u64, &DropReason) + Send,
{
    fn corruption(&mut self, bytes: u64, reason: &DropReason) {
        self(bytes, reason)
    }
}

/// A single reported drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionEvent {
    pub bytes: u64,
    pub reason: DropReason,
}

#[derive(Debug, Default)]
struct CorruptionLogInner {
    events: Vec<CorruptionEvent>,
    dropped_bytes: u64,
}

/// Shared collector of corruption reports.
///
/// Clones share the same underlying log, so one handle can be boxed into a
/// reader while another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct CorruptionLog {
    inner: Arc<Mutex<CorruptionLogInner>>,
}

impl CorruptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes reported as dropped.
    pub fn dropped_bytes(&self) -> u64 {
        self.inner.lock().dropped_bytes
    }

    pub fn events(&self) -> Vec<CorruptionEvent> {
        self.inner.lock().events.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Returns true if any event carries `reason`.
    pub fn contains(&self, reason: &DropReason) -> bool {
        self.inner.lock().events.iter().any(|e| &e.reason == reason)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.events.clear();
        inner.dropped_bytes = 0;
    }
}

impl Reporter for CorruptionLog {
    fn corruption(&mut self, bytes: u64, reason: &DropReason) {
        tracing::warn!(bytes, %reason, "Dropping log bytes");
        let mut inner = self.inner.lock();
        inner.dropped_bytes += bytes;
        inner.events.push(CorruptionEvent {
            bytes,
            reason: reason.clone(),
        });
    }
}
