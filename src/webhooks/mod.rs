#![forbid(unsafe_code)]

//! Webhook delivery (§4.6): enqueue a row per active subscription whenever
//! a matching event fires, then a worker pool drains due deliveries with
//! HMAC-signed POSTs, exponential backoff and an auto-disable streak.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use hmac::{Hmac, Mac};
use log::{info, warn};
use sha2::Sha256;
use uuid::Uuid;

use crate::utils::config::WebhookConfig;
use crate::utils::db::Store;
use crate::utils::db_types::WebhookDelivery;

type HmacSha256 = Hmac<Sha256>;

pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub async fn enqueue_for_event(store: &impl Store, event_type: &str, payload: serde_json::Value) -> anyhow::Result<usize> {
    let webhooks = store.active_webhooks_for_event(event_type).await?;
    for w in &webhooks {
        store.insert_webhook_delivery(w.id, event_type, payload.clone()).await?;
    }
    Ok(webhooks.len())
}

/// 0 / 30s / 2m / 10m / 1h / 6h for attempts 0..=5, capped at 6h beyond that.
fn backoff_for_attempt(attempt_count: i32) -> Duration {
    match attempt_count {
        0 => Duration::seconds(0),
        1 => Duration::seconds(30),
        2 => Duration::minutes(2),
        3 => Duration::minutes(10),
        4 => Duration::hours(1),
        _ => Duration::hours(6),
    }
}

pub async fn deliver_one(store: &impl Store, client: &reqwest::Client, cfg: &WebhookConfig, delivery: WebhookDelivery) -> anyhow::Result<()> {
    let Some(webhook) = store.get_webhook(delivery.webhook_id).await? else {
        return Ok(());
    };
    if !webhook.active {
        return Ok(());
    }

    let body = serde_json::to_vec(&delivery.payload)?;
    let signature = sign(&webhook.secret, &body);
    let timeout = std::time::Duration::from_secs(cfg.per_attempt_timeout_seconds);

    let outcome = client
        .post(&webhook.url)
        .header("X-Webhook-Signature", format!("sha256={signature}"))
        .header("Content-Type", "application/json")
        .timeout(timeout)
        .body(body)
        .send()
        .await;

    let attempt_count = delivery.attempt_count + 1;

    let (delivered, status_code, snippet) = match outcome {
        Ok(resp) => {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(cfg.response_snippet_bytes).collect();
            (status.is_success(), Some(status.as_u16() as i32), Some(snippet))
        }
        Err(e) => (false, None, Some(e.to_string().chars().take(cfg.response_snippet_bytes).collect())),
    };

    if delivered {
        store.update_webhook_delivery_attempt(delivery.id, attempt_count, None, status_code, snippet.as_deref(), true).await?;
        if webhook.consecutive_final_failures != 0 {
            store.set_webhook_failure_streak(webhook.id, 0).await?;
        }
        return Ok(());
    }

    let exhausted = attempt_count >= cfg.max_attempts as i32;
    let next_retry_at = if exhausted { None } else { Some(Utc::now() + backoff_for_attempt(attempt_count)) };
    store
        .update_webhook_delivery_attempt(delivery.id, attempt_count, next_retry_at, status_code, snippet.as_deref(), false)
        .await?;

    if exhausted {
        let streak = webhook.consecutive_final_failures + 1;
        store.set_webhook_failure_streak(webhook.id, streak).await?;
        warn!("webhook {} delivery {} exhausted retries (streak {})", webhook.id, delivery.id, streak);
        if streak >= cfg.auto_disable_after_consecutive_failures {
            store.set_webhook_active(webhook.id, false).await?;
            info!("webhook {} auto-disabled after {} consecutive final failures", webhook.id, streak);
        }
    }
    Ok(())
}

/// Manual retry: reset the delivery's attempt counter so the next sweep
/// picks it up immediately, independent of backoff.
pub async fn retry_delivery(store: &impl Store, webhook_id: Uuid, delivery_id: Uuid) -> anyhow::Result<bool> {
    if store.get_delivery(webhook_id, delivery_id).await?.is_none() {
        return Ok(false);
    }
    store.reset_webhook_delivery(delivery_id).await?;
    Ok(true)
}

/// Drains every due delivery through a bounded worker pool (§4.6's
/// `worker_pool_size`, default 8 concurrent attempts).
pub async fn drain_due(store: &(impl Store + Sync), client: &reqwest::Client, cfg: &WebhookConfig, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let due = store.deliveries_due(cfg.max_attempts as i32, now).await?;
    let count = due.len();
    stream::iter(due)
        .for_each_concurrent(cfg.worker_pool_size, |delivery| async move {
            if let Err(e) = deliver_one(store, client, cfg, delivery).await {
                warn!("webhook delivery attempt failed to record: {e:#}");
            }
        })
        .await;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hex() {
        let sig = sign("s3cr3t", b"{\"a\":1}");
        assert_eq!(sig, sign("s3cr3t", b"{\"a\":1}"));
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn backoff_schedule_matches_spec() {
        assert_eq!(backoff_for_attempt(1), Duration::seconds(30));
        assert_eq!(backoff_for_attempt(3), Duration::minutes(10));
        assert_eq!(backoff_for_attempt(9), Duration::hours(6));
    }
}
