use std::sync::Arc;
use tracing::debug;

use crate::attempt::AttemptFlag;
use crate::bus::{ChannelBus, SubscriptionSet};
use crate::connection::AgentSession;

/// Everything an attempt acquired that must be released when it ends.
#[derive(Debug, Default)]
pub struct AttemptResources {
    /// Topics subscribed on the master bus.
    pub subscriptions: SubscriptionSet,
    pub session: Option<AgentSession>,
    /// Topic subscribed on the agent bus during import.
    pub import_topic: Option<String>,
}

/// What one cleanup pass released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deactivated: bool,
    pub transport_closed: bool,
    pub unsubscribed: Vec<String>,
    pub import_topic: Option<String>,
}

impl CleanupReport {
    pub fn is_noop(&self) -> bool {
        !self.deactivated
            && !self.transport_closed
            && self.unsubscribed.is_empty()
            && self.import_topic.is_none()
    }
}

/// Releases attempt resources; safe to run any number of times.
pub struct CleanupSupervisor {
    master_bus: Arc<dyn ChannelBus>,
}

impl CleanupSupervisor {
    pub fn new(master_bus: Arc<dyn ChannelBus>) -> Self {
        Self { master_bus }
    }

    pub fn cleanup(&self, flag: &AttemptFlag, resources: &mut AttemptResources) -> CleanupReport {
        let mut report = CleanupReport {
            deactivated: flag.deactivate(),
            ..Default::default()
        };

        let session = resources.session.take();
        let agent_bus = session.as_ref().map(|s| Arc::clone(s.bus()));
        if let Some(session) = session {
            debug!(url = session.url(), "closing extension server connection");
            session.close();
            report.transport_closed = true;
        }

        for topic in resources.subscriptions.drain() {
            self.master_bus.unsubscribe(&topic);
            report.unsubscribed.push(topic);
        }

        if let Some(topic) = resources.import_topic.take() {
            if let Some(bus) = &agent_bus {
                bus.unsubscribe(&topic);
            }
            report.import_topic = Some(topic);
        }

        debug!(?report, "attempt resources released");
        report
    }
}
