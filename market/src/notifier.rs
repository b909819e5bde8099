//! Abstract outbound signaling. Delivery is best-effort: the core never blocks a commit on the
//! Notifier and swallows/logs its failures rather than propagating them.

use model::ids::TenantId;
use model::notification::NotificationKind;
use serde::Serialize;
use serde_json::Value;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        tenant_id: TenantId,
        recipient_class: &str,
        recipient_key: &str,
        sender: &str,
        kind: NotificationKind,
        payload: Value,
    );
}

/// Delivers notifications to the process log. Stands in for the real message bus, which is an
/// external collaborator out of scope for this core.
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifier for LoggingNotifier {
    async fn send(
        &self,
        tenant_id: TenantId,
        recipient_class: &str,
        recipient_key: &str,
        sender: &str,
        kind: NotificationKind,
        payload: Value,
    ) {
        tracing::info!(
            %tenant_id,
            recipient_class,
            recipient_key,
            sender,
            kind = kind.as_str(),
            %payload,
            "notification"
        );
    }
}

/// Helper for call sites with a concretely-typed payload: serializes it and fires-and-forgets,
/// logging (rather than propagating) a serialization failure.
pub async fn notify<T: Serialize>(
    notifier: &dyn Notifier,
    tenant_id: TenantId,
    recipient_class: &str,
    recipient_key: &str,
    sender: &str,
    kind: NotificationKind,
    payload: &T,
) {
    match serde_json::to_value(payload) {
        Ok(value) => notifier.send(tenant_id, recipient_class, recipient_key, sender, kind, value).await,
        Err(err) => tracing::error!(%tenant_id, ?err, "failed to serialize notification payload"),
    }
}
