use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::business_logic::config::TrackerConfig;
use crate::business_logic::schema::PatternFamily;
use crate::business_logic::thesis::ComponentUpdate;
use crate::errors::ServiceError;
use crate::models::pattern::{
    Pattern, PatternGeometry, PatternId, PatternStatus, PhaseTransition, PriceReaction,
};
use crate::models::snapshot::{EngineEvent, PatternThesisSnapshot};
use crate::services::events::EventHub;
use crate::services::store::{bounded, AlertSink, PatternStore};

#[derive(Debug)]
pub struct BatchFailure {
    pub pattern_id: PatternId,
    pub error: ServiceError,
}

/// Outcome of a multi-pattern update; failures never abort the batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub applied: Vec<PatternThesisSnapshot>,
    pub failures: Vec<BatchFailure>,
}

/// Registry of live patterns.
///
/// Each pattern sits behind its own mutex so concurrent updates to one
/// pattern are serialized while different patterns proceed in parallel.
/// Mutations run on a copy that is persisted before it replaces the live
/// pattern, so a failed write leaves the previous state in place.
pub struct ThesisTracker {
    patterns: RwLock<HashMap<PatternId, Arc<Mutex<Pattern>>>>,
    registration_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    store: Arc<dyn PatternStore>,
    alerts: Arc<dyn AlertSink>,
    events: EventHub,
    config: TrackerConfig,
}

impl ThesisTracker {
    pub fn new(
        store: Arc<dyn PatternStore>,
        alerts: Arc<dyn AlertSink>,
        events: EventHub,
        config: TrackerConfig,
    ) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            registration_gates: Mutex::new(HashMap::new()),
            store,
            alerts,
            events,
            config,
        }
    }

    /// Track a freshly detected pattern.
    ///
    /// Active patterns of the same family on the same symbol that were
    /// detected earlier are superseded by it. If a later detection is already
    /// active, the new pattern is recorded as superseded instead. Nothing is
    /// committed unless every write succeeds, so a failed registration can be
    /// retried as is.
    pub async fn register(
        &self,
        id: PatternId,
        family: PatternFamily,
        geometry: PatternGeometry,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        // registrations on one symbol run one at a time, without holding
        // the registry lock across writes
        let gate = self.registration_gate(&id.symbol).await;
        let _gate = gate.lock().await;
        if self.patterns.read().await.contains_key(&id) {
            return Err(ServiceError::Validation(format!(
                "pattern {} is already registered",
                id
            )));
        }

        self.register_gated(id, family, geometry, at).await
    }

    async fn register_gated(
        &self,
        id: PatternId,
        family: PatternFamily,
        geometry: PatternGeometry,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        let mut rivals: Vec<(PatternId, Arc<Mutex<Pattern>>)> = self
            .patterns
            .read()
            .await
            .iter()
            .filter(|(other, _)| other.symbol == id.symbol)
            .map(|(other, entry)| (other.clone(), entry.clone()))
            .collect();
        // rivals stay locked until the commit below
        rivals.sort_by(|a, b| a.0.detected_at.cmp(&b.0.detected_at));

        let mut guards = Vec::with_capacity(rivals.len());
        for (_, entry) in rivals {
            let guard = entry.lock_owned().await;
            if guard.family() == family && !guard.status().is_retired() {
                guards.push(guard);
            }
        }

        let mut pattern = Pattern::new(id.clone(), family, geometry);
        let newer = guards
            .iter()
            .map(|guard| guard.id())
            .filter(|other| other.detected_at > id.detected_at)
            .max_by_key(|other| other.detected_at)
            .cloned();

        let superseded: Vec<Pattern> = match &newer {
            Some(newer) => {
                pattern.supersede(newer, at);
                Vec::new()
            }
            None => guards
                .iter()
                .map(|current| {
                    let mut next = Pattern::clone(current);
                    next.supersede(&id, at);
                    next
                })
                .collect(),
        };

        // persist everything before any of it becomes visible
        let snapshot = pattern.snapshot(at);
        self.persist(&snapshot).await?;
        for next in &superseded {
            self.persist(&next.snapshot(at)).await?;
        }

        let mut retired: Vec<(PatternId, PatternStatus)> = superseded
            .iter()
            .map(|next| (next.id().clone(), next.status()))
            .collect();
        if pattern.status().is_retired() {
            retired.push((id.clone(), pattern.status()));
        }

        // commit
        self.patterns
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(pattern)));
        for (mut guard, next) in guards.into_iter().zip(superseded) {
            *guard = next;
        }

        match &newer {
            Some(newer) => tracing::info!(
                "[{}] {} detected at {} arrived after {}, recorded as superseded",
                id.symbol,
                family,
                id.detected_at,
                newer
            ),
            None => tracing::info!("[{}] Tracking {} detected at {}", id.symbol, family, id.detected_at),
        }

        for (pattern_id, status) in retired {
            self.announce(EngineEvent::PatternRetired {
                pattern_id,
                status,
                at,
            })
            .await?;
        }

        Ok(snapshot)
    }

    pub async fn apply_update(
        &self,
        id: &PatternId,
        update: &ComponentUpdate,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        self.mutate(id, at, |pattern| Ok(pattern.apply_update(update, at)?))
            .await
    }

    pub async fn reset_component(
        &self,
        id: &PatternId,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        self.mutate(id, at, |pattern| Ok(pattern.reset_component(name, at)?))
            .await
    }

    pub async fn update_geometry(
        &self,
        id: &PatternId,
        geometry: PatternGeometry,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        self.mutate(id, at, |pattern| Ok(pattern.update_geometry(geometry, at)))
            .await
    }

    /// Feed a new close to the pattern; may trigger breakout, target or invalidation
    pub async fn observe_price(
        &self,
        id: &PatternId,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ServiceError::Validation(format!(
                "price must be a positive number, got {}",
                price
            )));
        }

        let mut invalidated = false;
        let snapshot = self
            .mutate(id, at, |pattern| {
                let PriceReaction {
                    transition,
                    invalidated: hit,
                    ..
                } = pattern.observe_price(price, at)?;
                invalidated = hit;
                Ok(transition)
            })
            .await?;

        if invalidated {
            self.announce(EngineEvent::PatternRetired {
                pattern_id: id.clone(),
                status: snapshot.status,
                at,
            })
            .await?;
        }
        Ok(snapshot)
    }

    pub async fn invalidate(
        &self,
        id: &PatternId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        let snapshot = self
            .mutate(id, at, |pattern| {
                pattern.invalidate(reason, at);
                Ok(None)
            })
            .await?;

        self.announce(EngineEvent::PatternRetired {
            pattern_id: id.clone(),
            status: snapshot.status,
            at,
        })
        .await?;
        Ok(snapshot)
    }

    /// Apply updates across many patterns, collecting per-pattern failures
    pub async fn apply_batch(
        &self,
        updates: &[(PatternId, ComponentUpdate)],
        at: DateTime<Utc>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        // one failure never stops the rest of the batch
        for (id, update) in updates {
            match self.apply_update(id, update, at).await {
                Ok(snapshot) => report.applied.push(snapshot),
                Err(error) => {
                    tracing::error!("[{}] Update of {} failed: {}", id.symbol, update.name, error);
                    report.failures.push(BatchFailure {
                        pattern_id: id.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    pub async fn snapshot(
        &self,
        id: &PatternId,
        at: DateTime<Utc>,
    ) -> Result<PatternThesisSnapshot, ServiceError> {
        let entry = self.entry(id).await?;
        let pattern = entry.lock().await;
        Ok(pattern.snapshot(at))
    }

    /// Snapshots of every pattern, retired ones included, sorted by id
    pub async fn snapshots(&self, at: DateTime<Utc>) -> Vec<PatternThesisSnapshot> {
        // release the registry before waiting on any pattern lock
        let entries: Vec<_> = self.patterns.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.lock().await.snapshot(at));
        }
        snapshots.sort_by(|a, b| {
            a.pattern_id
                .symbol
                .cmp(&b.pattern_id.symbol)
                .then(a.pattern_id.detected_at.cmp(&b.pattern_id.detected_at))
        });
        snapshots
    }

    async fn mutate<F>(
        &self,
        id: &PatternId,
        at: DateTime<Utc>,
        change: F,
    ) -> Result<PatternThesisSnapshot, ServiceError>
    where
        F: FnOnce(&mut Pattern) -> Result<Option<PhaseTransition>, ServiceError>,
    {
        let entry = self.entry(id).await?;
        let mut current = entry.lock().await;
        if current.status().is_retired() {
            return Err(ServiceError::PatternRetired(id.clone()));
        }

        // work on a copy; the live pattern only changes once the write lands
        let mut next = current.clone();
        let transition = change(&mut next)?;
        let snapshot = next.snapshot(at);
        self.persist(&snapshot).await?;
        *current = next;
        drop(current);

        // state is committed from here on, a failed alert does not roll it back
        if let Some(transition) = transition {
            self.announce(EngineEvent::PhaseChanged {
                pattern_id: id.clone(),
                family: snapshot.family,
                from: transition.from,
                to: transition.to,
                completion_percent: snapshot.completion_percent,
                target_price: snapshot.target_price,
                at,
            })
            .await?;
        }

        Ok(snapshot)
    }

    async fn registration_gate(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.registration_gates
            .lock()
            .await
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    async fn entry(&self, id: &PatternId) -> Result<Arc<Mutex<Pattern>>, ServiceError> {
        self.patterns
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownPattern(id.clone()))
    }

    async fn persist(&self, snapshot: &PatternThesisSnapshot) -> Result<(), ServiceError> {
        bounded(
            self.config.collaborator_timeout,
            self.store.save_thesis(snapshot),
        )
        .await?;
        Ok(())
    }

    /// Publish on the hub, then hand to the alert sink
    async fn announce(&self, event: EngineEvent) -> Result<(), ServiceError> {
        self.events.publish(event.clone());
        bounded(self.config.collaborator_timeout, self.alerts.notify(&event)).await?;
        Ok(())
    }
}
