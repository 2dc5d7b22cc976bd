//! Best-effort event publishing to NATS.

use crate::domain::events::DomainEvent;

/// Forwards domain events to NATS when a connection is configured; otherwise
/// events are only traced.
#[derive(Clone, Debug, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, event: impl Into<DomainEvent>) {
        let event = event.into();
        let subject = event.subject();
        let Some(client) = &self.nats else {
            tracing::debug!(%subject, "event not published, NATS disabled");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%subject, %err, "event serialisation failed");
                return;
            }
        };
        if let Err(err) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(%subject, %err, "event publish failed");
        }
    }
}
