use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use validator::Validate;

use crate::business_logic::config::{LevelConfig, TrackerConfig};
use crate::business_logic::levels::{LevelBook, LevelUpdate, TouchOutcome};
use crate::errors::{CollaboratorError, ServiceError};
use crate::models::level::{LevelKey, TouchEvent};
use crate::models::snapshot::{EngineEvent, NearestLevels, SupportResistanceLevelSnapshot};
use crate::services::events::EventHub;
use crate::services::store::{bounded, AlertSink, PatternStore};

#[derive(Debug)]
pub struct SweepFailure {
    pub key: LevelKey,
    pub error: CollaboratorError,
}

/// Outcome of a deactivation sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deactivated: Vec<LevelKey>,
    pub refreshed: usize,
    pub failures: Vec<SweepFailure>,
}

/// Support/resistance catalog across symbols.
///
/// Match-or-create for a symbol runs under that symbol's lock, so two
/// concurrent touches at nearby prices cannot both create a level.
pub struct LevelTracker {
    books: RwLock<HashMap<String, Arc<Mutex<LevelBook>>>>,
    config: LevelConfig,
    tracker: TrackerConfig,
    store: Arc<dyn PatternStore>,
    alerts: Arc<dyn AlertSink>,
    events: EventHub,
}

impl LevelTracker {
    pub fn new(
        config: LevelConfig,
        tracker: TrackerConfig,
        store: Arc<dyn PatternStore>,
        alerts: Arc<dyn AlertSink>,
        events: EventHub,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        Ok(Self {
            books: RwLock::new(HashMap::new()),
            config,
            tracker,
            store,
            alerts,
            events,
        })
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// Attach the touch to a matching level or create one; the touch and
    /// level are persisted before the catalog changes.
    ///
    /// A failed alert for a new level is returned as an error, but the level
    /// stays in the catalog.
    pub async fn ingest(&self, touch: &TouchEvent) -> Result<LevelUpdate, ServiceError> {
        touch.validate()?;

        // match-or-create runs under the symbol's lock
        let book = self.book(&touch.symbol).await;
        let mut book = book.lock().await;

        let update = book.plan_touch(touch, &self.config);
        let snapshot = SupportResistanceLevelSnapshot::from(&update.level);
        self.call(self.store.save_level(&snapshot)).await?;
        self.call(self.store.append_touch(&update.touch)).await?;
        book.commit(update.clone());
        drop(book);

        match update.outcome {
            TouchOutcome::Created => {
                tracing::info!(
                    "[{}] New {} level {} at {:.2}",
                    touch.symbol,
                    update.level.level_type,
                    update.level.key,
                    update.level.price
                );
                self.announce(EngineEvent::LevelCreated { level: snapshot })
                    .await?;
            }
            TouchOutcome::Attached => tracing::debug!(
                "[{}] Touch at {:.2} attached to {} (touches: {}, strength: {:.1})",
                touch.symbol,
                touch.price,
                update.level.key,
                update.level.touches,
                update.level.strength
            ),
        }

        Ok(update)
    }

    pub async fn find_nearest(&self, symbol: &str, price: f64) -> NearestLevels {
        let Some(book) = self.books.read().await.get(symbol).cloned() else {
            return NearestLevels::default();
        };
        let book = book.lock().await;
        let (support, resistance) = book.find_nearest(price);

        NearestLevels {
            support: support.map(SupportResistanceLevelSnapshot::from),
            resistance: resistance.map(SupportResistanceLevelSnapshot::from),
        }
    }

    pub async fn levels(&self, symbol: &str) -> Vec<SupportResistanceLevelSnapshot> {
        let Some(book) = self.books.read().await.get(symbol).cloned() else {
            return Vec::new();
        };
        let book = book.lock().await;
        book.levels()
            .iter()
            .map(SupportResistanceLevelSnapshot::from)
            .collect()
    }

    /// Deactivate levels untouched for longer than `max_age_hours` and refresh
    /// the recency discount on the rest.
    ///
    /// A failed write for one level is recorded and the sweep moves on; that
    /// level keeps its previous state and is picked up again next time.
    pub async fn sweep(&self, max_age_hours: f64, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut books: Vec<_> = self
            .books
            .read()
            .await
            .iter()
            .map(|(symbol, book)| (symbol.clone(), book.clone()))
            .collect();
        books.sort_by(|a, b| a.0.cmp(&b.0));

        for (symbol, book) in books {
            let mut book = book.lock().await;
            let stale = book.stale_levels(max_age_hours, now);

            // deactivate stale levels; each is written before it changes in memory
            for key in &stale {
                let Some(level) = book.level(key) else {
                    continue;
                };
                let mut snapshot = SupportResistanceLevelSnapshot::from(level);
                snapshot.active = false;

                match self.call(self.store.save_level(&snapshot)).await {
                    Ok(()) => {
                        book.deactivate(key);
                        tracing::info!("[{}] Deactivated {} (no touch in {}h)", symbol, key, max_age_hours);
                        report.deactivated.push(key.clone());
                        let event = EngineEvent::LevelDeactivated {
                            key: key.clone(),
                            price: snapshot.price,
                            level_type: snapshot.level_type,
                            at: now,
                        };
                        if let Err(error) = self.announce(event).await {
                            tracing::error!("[{}] Alert for {} failed: {}", symbol, key, error);
                            report.failures.push(SweepFailure {
                                key: key.clone(),
                                error,
                            });
                        }
                    }
                    Err(error) => {
                        tracing::error!("[{}] Failed to deactivate {}: {}", symbol, key, error);
                        report.failures.push(SweepFailure {
                            key: key.clone(),
                            error,
                        });
                    }
                }
            }

            // refresh the recency discount on everything still active
            let survivors: Vec<_> = book
                .refreshed_strengths(&self.config.strength, now)
                .into_iter()
                .filter(|(key, _)| !stale.contains(key))
                .collect();
            for (key, strength) in survivors {
                let Some(level) = book.level(&key) else {
                    continue;
                };
                let mut snapshot = SupportResistanceLevelSnapshot::from(level);
                snapshot.strength = strength;

                match self.call(self.store.save_level(&snapshot)).await {
                    Ok(()) => {
                        book.set_strength(&key, strength);
                        report.refreshed += 1;
                    }
                    Err(error) => {
                        tracing::error!("[{}] Failed to refresh {}: {}", symbol, key, error);
                        report.failures.push(SweepFailure { key, error });
                    }
                }
            }
        }

        report
    }

    async fn book(&self, symbol: &str) -> Arc<Mutex<LevelBook>> {
        if let Some(book) = self.books.read().await.get(symbol) {
            return book.clone();
        }

        self.books
            .write()
            .await
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LevelBook::new(symbol))))
            .clone()
    }

    /// Publish on the hub, then hand to the alert sink
    async fn announce(&self, event: EngineEvent) -> Result<(), CollaboratorError> {
        self.events.publish(event.clone());
        self.call(self.alerts.notify(&event)).await
    }

    async fn call<F>(&self, call: F) -> Result<(), CollaboratorError>
    where
        F: std::future::Future<Output = Result<(), CollaboratorError>>,
    {
        bounded(self.tracker.collaborator_timeout, call).await
    }
}
