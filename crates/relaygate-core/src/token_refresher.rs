//! Background OAuth token refresh (spec §4.B): a single periodic task that walks every
//! enabled provider's credential pool and proactively rotates access tokens that are about
//! to expire, rather than waiting for a request to hit a 401.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use relaygate_provider_core::{
    Credential, CredentialId, CredentialRefreshFailedEvent, CredentialRefreshedEvent, Event,
    Op, OperationalEvent, ProviderConfig, ProviderRegistry, UpstreamCtx,
};
use relaygate_storage::Storage;
use tokio::sync::watch;
use tokio::time::interval;

use crate::proxy_engine::provider_impl_name_from_config;
use crate::state::AppState;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(30 * 60);

/// Drives proactive credential refresh. `start`/`stop` are idempotent: a second `start`
/// while already running is a no-op, and `stop` followed by another `start` spawns a
/// fresh loop.
pub struct TokenRefresher {
    state: Arc<AppState>,
    storage: Arc<dyn Storage>,
    registry: Arc<ProviderRegistry>,
    check_interval: Duration,
    refresh_buffer: Duration,
    running: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl TokenRefresher {
    pub fn new(
        state: Arc<AppState>,
        storage: Arc<dyn Storage>,
        registry: Arc<ProviderRegistry>,
    ) -> Arc<Self> {
        Self::with_intervals(
            state,
            storage,
            registry,
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_REFRESH_BUFFER,
        )
    }

    pub fn with_intervals(
        state: Arc<AppState>,
        storage: Arc<dyn Storage>,
        registry: Arc<ProviderRegistry>,
        check_interval: Duration,
        refresh_buffer: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            storage,
            registry,
            check_interval,
            refresh_buffer,
            running: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
        })
    }

    /// Spawns the background loop. Refreshes once immediately, then on every tick.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *self.stop_tx.lock().unwrap() = Some(tx);

        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(this.check_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.run_once().await;
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// One sweep over every enabled provider's credentials. Exposed for tests and for the
    /// immediate on-start refresh; providers are visited sequentially so refreshes against
    /// a shared identity endpoint never run concurrently.
    pub async fn run_once(&self) {
        let providers: Vec<(String, serde_json::Value)> = {
            let snapshot = self.state.snapshot.load();
            snapshot
                .providers
                .iter()
                .filter(|p| p.enabled)
                .map(|p| (p.name.clone(), p.config_json.clone()))
                .collect()
        };

        for (provider_name, config_json) in providers {
            self.refresh_provider(&provider_name, config_json).await;
        }
    }

    async fn refresh_provider(&self, provider_name: &str, config_json: serde_json::Value) {
        let Ok(cfg) = serde_json::from_value::<ProviderConfig>(config_json) else {
            return;
        };
        let Some(provider_impl) = self.registry.get(provider_impl_name_from_config(&cfg)) else {
            return;
        };
        let runtime = {
            let map = self.state.providers.load();
            map.get(provider_name).cloned()
        };
        let Some(runtime) = runtime else {
            return;
        };

        let entries = runtime.pool.entries_for_provider(provider_name).await;
        let deadline = now_unix() + self.refresh_buffer.as_secs() as i64;

        for (credential_id, credential) in entries {
            let Some(expires_at) = credential.expires_at() else {
                continue;
            };
            if expires_at > deadline {
                continue;
            }

            let ctx = UpstreamCtx {
                trace_id: None,
                user_id: None,
                user_key_id: None,
                user_agent: None,
                outbound_proxy: self.state.global.load().proxy.clone(),
                provider: provider_name.to_string(),
                credential_id: Some(credential_id),
                op: Op::ModelList,
                internal: true,
                attempt_no: 0,
            };

            match provider_impl
                .refresh_credential(&ctx, &cfg, &credential)
                .await
            {
                Ok(Some(mut refreshed)) => {
                    refreshed.preserve_refresh_token(&credential);
                    match self.persist_credential(credential_id, &refreshed).await {
                        Ok(()) => self.emit_refreshed(credential_id, provider_name).await,
                        Err(err) => {
                            self.emit_failed(credential_id, provider_name, err.to_string())
                                .await
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    self.emit_failed(credential_id, provider_name, err.to_string())
                        .await
                }
            }
        }
    }

    async fn persist_credential(
        &self,
        credential_id: CredentialId,
        credential: &Credential,
    ) -> anyhow::Result<()> {
        let secret_json = serde_json::to_value(credential)?;
        let (name, settings_json) = {
            let snapshot = self.state.snapshot.load();
            let row = snapshot.credentials.iter().find(|c| c.id == credential_id);
            (
                row.and_then(|r| r.name.clone()),
                row.map(|r| r.settings_json.clone())
                    .unwrap_or_else(|| serde_json::json!({})),
            )
        };
        self.storage
            .update_credential(credential_id, name.as_deref(), &settings_json, &secret_json)
            .await?;
        self.state
            .apply_credential_update(credential_id, name, settings_json, secret_json)
            .await?;
        Ok(())
    }

    async fn emit_refreshed(&self, credential_id: CredentialId, provider: &str) {
        self.state
            .events
            .emit(Event::Operational(OperationalEvent::CredentialRefreshed(
                CredentialRefreshedEvent {
                    at: SystemTime::now(),
                    credential_id,
                    provider: provider.to_string(),
                },
            )))
            .await;
    }

    async fn emit_failed(&self, credential_id: CredentialId, provider: &str, error: String) {
        self.state
            .events
            .emit(Event::Operational(OperationalEvent::CredentialRefreshFailed(
                CredentialRefreshFailedEvent {
                    at: SystemTime::now(),
                    credential_id,
                    provider: provider.to_string(),
                    error,
                },
            )))
            .await;
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intervals_match_spec() {
        assert_eq!(DEFAULT_CHECK_INTERVAL, Duration::from_secs(600));
        assert_eq!(DEFAULT_REFRESH_BUFFER, Duration::from_secs(1800));
    }
}
