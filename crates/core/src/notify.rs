//! Notification outbox.
//!
//! Critical-value and report-ready notifications are fire-and-forget relative
//! to the save transaction: enqueueing never blocks and never fails the
//! caller, and delivery failures are logged and swallowed. Retries, if any,
//! belong to the delivery collaborator behind [`ReportNotifier`].
//!
//! The queue is a bounded in-process outbox. The host decides when to pump it
//! (e.g. from a background task), keeping delivery decoupled from the
//! transactional save.

use crate::report::CriticalValue;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A notification awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A report was saved with one or more critical values requiring
    /// clinician notification.
    Critical {
        report_id: String,
        patient_id: String,
        values: Vec<CriticalValue>,
    },
    /// A report was released and is ready for the patient / ordering
    /// clinician.
    ReportReady {
        report_id: String,
        patient_id: String,
    },
}

impl Notification {
    fn report_id(&self) -> &str {
        match self {
            Notification::Critical { report_id, .. } => report_id,
            Notification::ReportReady { report_id, .. } => report_id,
        }
    }
}

/// Delivery failure reported by a notifier.
#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound delivery collaborator (SMS, email, pager), supplied by the host.
pub trait ReportNotifier: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] on delivery failure. The queue logs and
    /// drops failed entries; it never retries synchronously.
    fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Bounded in-process notification outbox.
#[derive(Debug)]
pub struct NotificationQueue {
    capacity: usize,
    pending: Mutex<VecDeque<Notification>>,
}

impl NotificationQueue {
    /// Creates a queue holding at most `capacity` undelivered notifications.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueues a notification. Never blocks, never fails.
    ///
    /// When the queue is full the oldest entry is dropped and logged; losing
    /// an old notification is preferable to failing or delaying a save.
    pub fn enqueue(&self, notification: Notification) {
        let mut pending = self.locked();
        if pending.len() >= self.capacity {
            if let Some(dropped) = pending.pop_front() {
                tracing::warn!(
                    report_id = %dropped.report_id(),
                    "notification queue full, dropping oldest entry"
                );
            }
        }
        pending.push_back(notification);
    }

    /// Number of undelivered notifications.
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    /// Delivers all queued notifications through `notifier`.
    ///
    /// Per-entry failures are logged and the entry is dropped. Returns the
    /// number successfully delivered.
    pub fn drain(&self, notifier: &dyn ReportNotifier) -> usize {
        let batch: Vec<Notification> = {
            let mut pending = self.locked();
            pending.drain(..).collect()
        };

        let mut delivered = 0;
        for notification in &batch {
            match notifier.deliver(notification) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        report_id = %notification.report_id(),
                        %err,
                        "notification delivery failed, entry dropped"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier {
        delivered: AtomicUsize,
        fail_report: Option<String>,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                delivered: AtomicUsize::new(0),
                fail_report: None,
            }
        }

        fn failing_on(report_id: &str) -> Self {
            Self {
                delivered: AtomicUsize::new(0),
                fail_report: Some(report_id.to_string()),
            }
        }
    }

    impl ReportNotifier for CountingNotifier {
        fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.fail_report.as_deref() == Some(notification.report_id()) {
                return Err(NotifyError("gateway unavailable".to_string()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ready(report_id: &str) -> Notification {
        Notification::ReportReady {
            report_id: report_id.to_string(),
            patient_id: "P1".to_string(),
        }
    }

    #[test]
    fn test_enqueue_and_drain() {
        let queue = NotificationQueue::new(8);
        queue.enqueue(ready("RPT260823001"));
        queue.enqueue(ready("RPT260823002"));
        assert_eq!(queue.len(), 2);

        let notifier = CountingNotifier::new();
        assert_eq!(queue.drain(&notifier), 2);
        assert!(queue.is_empty());
        assert_eq!(notifier.delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = NotificationQueue::new(2);
        queue.enqueue(ready("RPT1"));
        queue.enqueue(ready("RPT2"));
        queue.enqueue(ready("RPT3"));
        assert_eq!(queue.len(), 2);

        let batch: Vec<String> = {
            let pending = queue.locked();
            pending.iter().map(|n| n.report_id().to_string()).collect()
        };
        assert_eq!(batch, vec!["RPT2".to_string(), "RPT3".to_string()]);
    }

    #[test]
    fn test_delivery_failure_is_swallowed() {
        let queue = NotificationQueue::new(8);
        queue.enqueue(ready("RPT_BAD"));
        queue.enqueue(ready("RPT_OK"));

        let notifier = CountingNotifier::failing_on("RPT_BAD");
        assert_eq!(queue.drain(&notifier), 1);
        // Failed entry is dropped, not requeued.
        assert!(queue.is_empty());
    }
}
