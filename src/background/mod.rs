#![forbid(unsafe_code)]

//! The background scheduler (§4.7): five independent periodic loops plus
//! the webhook dispatcher, each logging its start/end and mutation count,
//! each retrying on its own next tick rather than backing off, and each
//! continuing to run after a single failed iteration.

use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info};
use tokio::task::JoinHandle;

use crate::events::Bus;
use crate::utils::config::Config;
use crate::utils::db::Store;
use crate::{availability, reservations, waitlist, webhooks};

fn spawn_loop<S, F, Fut>(name: &'static str, period: StdDuration, mut tick: F) -> JoinHandle<()>
where
    S: Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<usize>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match tick().await {
                Ok(n) => info!("[{name}] tick complete, {n} row(s) affected"),
                Err(e) => error!("[{name}] tick failed: {e:#}"),
            }
        }
    })
}

/// Spawns every periodic task and returns their handles. The caller (main)
/// holds these only to keep the tasks alive for the process lifetime;
/// none of them are expected to return. `bus`/`cfg` are `'static` references
/// into the process-wide runtime context (the same shape every `v1` handler
/// reaches them through via `ctx()`), so they're plain `Copy` captures
/// rather than `Arc` clones.
pub fn spawn_all<S: Store + Clone + Send + Sync + 'static>(store: S, bus: &'static Bus, cfg: &'static Config) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let store = store.clone();
        handles.push(spawn_loop::<S, _, _>(
            "reservation-expire",
            StdDuration::from_secs(cfg.reservations.expire_sweep_seconds),
            move || {
                let store = store.clone();
                async move { reservations::expire_sweep(&store, bus, cfg, Utc::now()).await }
            },
        ));
    }

    {
        let store = store.clone();
        handles.push(spawn_loop::<S, _, _>(
            "waitlist-offer-expire",
            StdDuration::from_secs(cfg.waitlist.offer_expire_sweep_seconds),
            move || {
                let store = store.clone();
                async move { waitlist::offer_expire_sweep(&store, bus, cfg, Utc::now()).await }
            },
        ));
    }

    {
        let store = store.clone();
        handles.push(spawn_loop::<S, _, _>(
            "revoked-token-sweep",
            StdDuration::from_secs(cfg.background.revoked_token_sweep_seconds),
            move || {
                let store = store.clone();
                async move {
                    let before = Utc::now() - ChronoDuration::days(7);
                    Ok(store.sweep_stale_refresh_tokens(before).await? as usize)
                }
            },
        ));
    }

    {
        let store = store.clone();
        handles.push(spawn_loop::<S, _, _>(
            "resource-auto-reset",
            StdDuration::from_secs(cfg.background.resource_auto_reset_seconds),
            move || {
                let store = store.clone();
                async move {
                    let due = store.resources_due_for_auto_reset(Utc::now()).await?;
                    let n = due.len();
                    for r in due {
                        store.update_resource_status(r.id, "available", None).await?;
                    }
                    Ok(n)
                }
            },
        ));
    }

    {
        let store = store.clone();
        handles.push(spawn_loop::<S, _, _>(
            "resource-status-sync",
            StdDuration::from_secs(cfg.background.resource_status_sync_seconds),
            move || {
                let store = store.clone();
                async move { availability::sync_resource_status(&store, Utc::now()).await }
            },
        ));
    }

    {
        let store = store.clone();
        let client = reqwest::Client::new();
        handles.push(spawn_loop::<S, _, _>(
            "webhook-dispatch",
            StdDuration::from_secs(cfg.webhooks.dispatch_interval_seconds),
            move || {
                let store = store.clone();
                let client = client.clone();
                async move { webhooks::drain_due(&store, &client, &cfg.webhooks, Utc::now()).await }
            },
        ));
    }

    handles
}
