use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use crate::attempt::Attempt;
use crate::bus::ChannelBus;
use crate::error::{ConnectError, ProvisionError, Result, TransportError, ValidationError};
use devspace_messages::{msg, MESSAGES};

const SUPPORTED_SCHEMES: [&str; 4] = ["ws", "wss", "http", "https"];

/// Opens extension-server connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> std::result::Result<Box<dyn Connection>, TransportError>;
}

/// An open extension-server connection.
pub trait Connection: Send + Sync {
    fn bus(&self) -> Arc<dyn ChannelBus>;
    fn close(&self);
}

/// Agent connection owned by one attempt.
pub struct AgentSession {
    url: String,
    bus: Arc<dyn ChannelBus>,
    connection: Box<dyn Connection>,
}

impl AgentSession {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bus(&self) -> &Arc<dyn ChannelBus> {
        &self.bus
    }

    pub fn close(self) {
        self.connection.close();
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession").field("url", &self.url).finish()
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    retry_delay: Duration,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, retry_delay: Duration) -> Self {
        Self {
            transport,
            retry_delay,
        }
    }

    /// Opens `url`, trying at most `budget` times with a fixed delay between
    /// attempts. Stops early when the attempt is aborted.
    #[instrument(skip(self, attempt), fields(attempt_id = %attempt.id()))]
    pub async fn connect(&self, url: &str, budget: u32, attempt: &Attempt) -> Result<AgentSession> {
        validate_url(url)?;

        let mut budget = crate::retry::RetryBudget::new(budget);
        loop {
            let err = match self.transport.open(url).await {
                Ok(connection) => {
                    let bus = connection.bus();
                    register_close_handler(bus.as_ref(), attempt);
                    info!(attempts = budget.used() + 1, "connected to extension server");
                    return Ok(AgentSession {
                        url: url.to_string(),
                        bus,
                        connection,
                    });
                }
                Err(err) => err,
            };

            let remaining = budget.consume();
            if remaining == 0 {
                return Err(ConnectError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: budget.used(),
                }
                .into());
            }
            warn!(error = %err, remaining, "extension server not reachable yet");

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = attempt.aborted() => return Err(ProvisionError::Aborted),
            }
        }
    }
}

/// Reports `ConnectError::Closed` through `attempt` while it is active.
pub fn register_close_handler(bus: &dyn ChannelBus, attempt: &Attempt) {
    let attempt = attempt.clone();
    bus.on_close(Box::new(move || {
        if attempt.flag().is_active() {
            attempt.fail(&ConnectError::Closed.into());
        }
    }));
}

fn validate_url(raw: &str) -> std::result::Result<Url, ValidationError> {
    let parsed = Url::parse(raw).map_err(|e| {
        ValidationError::new(msg!(
            MESSAGES.connection.url_invalid,
            url = raw,
            error = e.to_string()
        ))
    })?;
    if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
        return Err(ValidationError::new(msg!(
            MESSAGES.connection.url_invalid,
            url = raw,
            error = format!("unsupported scheme '{}'", parsed.scheme())
        )));
    }
    Ok(parsed)
}
