//! Persistence gateway
//!
//! Single entry point for the request layer. Tiers are tried in fixed
//! priority order (remote document API, primary database, fallback store)
//! and the first tier that completes wins. Tier failures are logged and
//! swallowed; callers only ever see validation errors, not-found, or a
//! result tagged with the tier that produced it.
//!
//! # Deduplication
//!
//! Before a durable insert the tier is asked for the latest note with the
//! same text. A match created within the dedup window is returned as a
//! duplicate instead of inserting, and no lower tier is consulted. The
//! fallback store never deduplicates.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::db::{ConnectionCache, DatabaseTier, PgConnector, RetryPolicy};
use crate::error::{GatewayResult, TierResult};
use crate::memory::FallbackStore;
use crate::model::{validate_position, Note, NoteDraft};
use crate::remote::RemoteDocumentClient;
use crate::tier::{DurableTier, TierKind, UpdateStatus};

/// Result of [`PersistenceGateway::create`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOutcome {
    pub note: Note,
    pub tier: TierKind,
    pub duplicate: bool,
}

/// Result of [`PersistenceGateway::update_position`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub tier: TierKind,
}

/// Read-only introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStatus {
    pub primary_connection_live: bool,
    pub fallback_count: usize,
}

pub struct PersistenceGateway {
    tiers: Vec<Arc<dyn DurableTier>>,
    database: Option<Arc<ConnectionCache<PgConnector>>>,
    fallback: FallbackStore,
    dedup_window: Duration,
}

impl PersistenceGateway {
    /// Build the tier chain from configuration and warm the database
    /// connection.
    ///
    /// Never fails: a tier that cannot be set up is left out and the
    /// fallback store is always there.
    pub async fn init(config: &GatewayConfig) -> Self {
        let mut tiers: Vec<Arc<dyn DurableTier>> = Vec::new();

        if config.remote.is_configured() {
            match RemoteDocumentClient::new(
                config.remote.clone(),
                config.selection_timeout(),
                config.socket_timeout(),
            ) {
                Ok(client) => tiers.push(Arc::new(client)),
                Err(e) => warn!(error = %e, "remote document client unavailable"),
            }
        } else {
            debug!("remote document API not configured, tier disabled");
        }

        let database = PgConnector::from_config(config).map(|connector| {
            let policy = RetryPolicy {
                max_attempts: config.connect_attempts,
                initial_backoff: config.initial_backoff(),
            };
            Arc::new(ConnectionCache::new(connector, policy))
        });
        match &database {
            Some(cache) => tiers.push(Arc::new(DatabaseTier::new(Arc::clone(cache)))),
            None => debug!("no database URL configured, tier disabled"),
        }

        let gateway = Self {
            tiers,
            database,
            fallback: FallbackStore::new(),
            dedup_window: config.dedup_window(),
        };

        // Pay the cold-start cost before the first request arrives.
        if let Some(cache) = &gateway.database {
            if let Err(e) = cache.get_connection().await {
                warn!(error = %e, "database warm-up failed, continuing without it");
            }
        }

        info!(
            tiers = ?gateway.tier_kinds(),
            "persistence gateway ready"
        );
        gateway
    }

    /// Gateway over an explicit tier chain, highest priority first.
    pub fn with_tiers(tiers: Vec<Arc<dyn DurableTier>>, dedup_window: Duration) -> Self {
        Self {
            tiers,
            database: None,
            fallback: FallbackStore::new(),
            dedup_window,
        }
    }

    /// Close the primary database pool, if one was established.
    pub async fn shutdown(&self) {
        if let Some(cache) = &self.database {
            cache.shutdown().await;
        }
        info!("persistence gateway shut down");
    }

    /// Durable tiers in priority order, followed by the fallback store.
    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.active_tiers()
            .map(|tier| tier.kind())
            .chain(std::iter::once(TierKind::Memory))
            .collect()
    }

    /// All notes from the first tier able to list them.
    pub async fn list(&self) -> Vec<Note> {
        for tier in self.active_tiers() {
            match tier.list().await {
                Ok(notes) => {
                    debug!(tier = %tier.kind(), count = notes.len(), "listed notes");
                    return notes;
                }
                Err(e) => warn!(tier = %tier.kind(), error = %e, "list failed, trying next tier"),
            }
        }
        self.fallback.list()
    }

    /// Validate and store a note in the first tier that accepts it.
    pub async fn create(
        &self,
        text: &str,
        kind: Option<&str>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> GatewayResult<CreateOutcome> {
        let draft = NoteDraft::new(text, kind, x, y)?;

        for tier in self.active_tiers() {
            match self.create_in(tier, &draft).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!(tier = %tier.kind(), error = %e, "create failed, trying next tier")
                }
            }
        }

        let note = self.fallback.create(draft);
        debug!(id = %note.id, "note stored in fallback store");
        Ok(CreateOutcome {
            note,
            tier: TierKind::Memory,
            duplicate: false,
        })
    }

    /// Move a note; the first tier that holds the id applies the change.
    pub async fn update_position(&self, id: &str, x: f64, y: f64) -> GatewayResult<UpdateOutcome> {
        let id = validate_position(id, x, y)?;

        for tier in self.active_tiers() {
            match tier.update_position(&id, x, y).await {
                Ok(UpdateStatus::Applied) => return Ok(UpdateOutcome { tier: tier.kind() }),
                Ok(UpdateStatus::Missed) => {
                    debug!(tier = %tier.kind(), id = %id, "id not held by tier")
                }
                Err(e) => {
                    warn!(tier = %tier.kind(), error = %e, "update failed, trying next tier")
                }
            }
        }

        // A durable id whose tiers are all down lands here too and is
        // reported as not found.
        self.fallback.update_position(&id, x, y)?;
        Ok(UpdateOutcome {
            tier: TierKind::Memory,
        })
    }

    pub async fn debug_status(&self) -> DebugStatus {
        let mut primary_connection_live = false;
        for tier in self.active_tiers() {
            if tier.kind() == TierKind::Database && tier.is_live().await {
                primary_connection_live = true;
            }
        }
        DebugStatus {
            primary_connection_live,
            fallback_count: self.fallback.len(),
        }
    }

    async fn create_in(&self, tier: &dyn DurableTier, draft: &NoteDraft) -> TierResult<CreateOutcome> {
        if let Some(existing) = tier.latest_with_text(&draft.text).await? {
            if self.within_dedup_window(existing.created_at, Utc::now()) {
                info!(tier = %tier.kind(), id = %existing.id, "duplicate submission suppressed");
                return Ok(CreateOutcome {
                    note: existing,
                    tier: tier.kind(),
                    duplicate: true,
                });
            }
        }

        let note = tier.insert(draft).await?;
        debug!(tier = %tier.kind(), id = %note.id, "note created");
        Ok(CreateOutcome {
            note,
            tier: tier.kind(),
            duplicate: false,
        })
    }

    fn within_dedup_window(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age_ms = now
            .signed_duration_since(created_at)
            .num_milliseconds()
            .unsigned_abs();
        u128::from(age_ms) <= self.dedup_window.as_millis()
    }

    fn active_tiers(&self) -> impl Iterator<Item = &dyn DurableTier> + '_ {
        self.tiers
            .iter()
            .map(|tier| tier.as_ref())
            .filter(|tier| tier.is_configured())
    }
}
