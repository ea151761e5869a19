use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

use crate::api::Notifier;
use crate::error::{ProvisionError, Result};
use crate::progress::ProgressHandle;

/// Whether the attempt still owns its handlers.
///
/// Starts active and is switched off exactly once, by cleanup.
#[derive(Debug, Clone)]
pub struct AttemptFlag(Arc<AtomicBool>);

impl AttemptFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns true only for the call that switched the flag off.
    pub fn deactivate(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for AttemptFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// One provisioning attempt, shared with every handler it registers.
///
/// The first reported failure marks the current step, notifies the operator
/// and raises the abort signal; later failures are only logged.
#[derive(Clone)]
pub struct Attempt {
    id: Arc<str>,
    progress: ProgressHandle,
    notifier: Arc<dyn Notifier>,
    active: AttemptFlag,
    failed: Arc<AtomicBool>,
    abort: Arc<watch::Sender<bool>>,
}

impl Attempt {
    pub fn new(progress: ProgressHandle, notifier: Arc<dyn Notifier>) -> Self {
        let (abort, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4().to_string().into(),
            progress,
            notifier,
            active: AttemptFlag::new(),
            failed: Arc::new(AtomicBool::new(false)),
            abort: Arc::new(abort),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    pub fn flag(&self) -> &AttemptFlag {
        &self.active
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// `Err(Aborted)` once the attempt has failed. Checked before every
    /// remote call that would push the attempt further.
    pub fn ensure_active(&self) -> Result<()> {
        if self.has_failed() {
            debug!(attempt_id = %self.id, "attempt already failed, stopping");
            return Err(ProvisionError::Aborted);
        }
        Ok(())
    }

    /// Reports `err` if it is the attempt's first failure.
    pub fn fail(&self, err: &ProvisionError) -> bool {
        if self.failed.swap(true, Ordering::SeqCst) {
            debug!(attempt_id = %self.id, error = %err, "attempt already failed");
            return false;
        }

        error!(attempt_id = %self.id, error = %err, "provisioning attempt failed");
        self.progress.fail_current(err.log_line().as_deref());
        if let Some(notification) = err.notification() {
            notification.deliver(self.notifier.as_ref());
        }
        self.abort.send_replace(true);
        true
    }

    /// Completes once the attempt has failed.
    pub async fn aborted(&self) {
        let mut rx = self.abort.subscribe();
        let signalled = rx.wait_for(|aborted| *aborted).await.map(|_| ());
        if signalled.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::test_utils::{Notice, RecordingNotifier};
    use std::time::Duration;

    #[test]
    fn test_flag_flips_once() {
        let flag = AttemptFlag::new();
        let clone = flag.clone();
        assert!(flag.is_active());
        assert!(clone.deactivate());
        assert!(!flag.deactivate());
        assert!(!flag.is_active());
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let notifier = Arc::new(RecordingNotifier::default());
        let attempt = Attempt::new(ProgressHandle::new("marker"), notifier.clone());

        assert!(attempt.fail(&ConnectError::Closed.into()));
        assert!(!attempt.fail(&ProvisionError::AgentStart {
            message: "late".into()
        }));

        assert_eq!(notifier.notices().len(), 1);
        assert!(matches!(notifier.notices()[0], Notice::Alert { .. }));
        assert!(attempt.progress().has_error());
        tokio::time::timeout(Duration::from_secs(1), attempt.aborted())
            .await
            .expect("Abort signal should be raised");
    }

    #[test]
    fn test_ensure_active_stops_after_failure() {
        let notifier = Arc::new(RecordingNotifier::default());
        let attempt = Attempt::new(ProgressHandle::new("marker"), notifier);
        assert!(attempt.ensure_active().is_ok());

        attempt.fail(&ConnectError::Closed.into());
        assert!(matches!(attempt.ensure_active(), Err(ProvisionError::Aborted)));
    }

    #[tokio::test]
    async fn test_aborted_signal_is_sticky() {
        let notifier = Arc::new(RecordingNotifier::default());
        let attempt = Attempt::new(ProgressHandle::new("marker"), notifier);
        let waiter = attempt.clone();
        let handle = tokio::spawn(async move { waiter.aborted().await });

        attempt.fail(&ProvisionError::Aborted);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Waiter should finish")
            .expect("Waiter should not panic");
    }
}
