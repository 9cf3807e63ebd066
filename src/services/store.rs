use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::CollaboratorError;
use crate::models::level::{LevelKey, SRLevelTouch};
use crate::models::pattern::PatternId;
use crate::models::snapshot::{EngineEvent, PatternThesisSnapshot, SupportResistanceLevelSnapshot};

/// Persistence collaborator for thesis and level snapshots
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn save_thesis(&self, snapshot: &PatternThesisSnapshot) -> Result<(), CollaboratorError>;

    async fn save_level(
        &self,
        snapshot: &SupportResistanceLevelSnapshot,
    ) -> Result<(), CollaboratorError>;

    async fn append_touch(&self, touch: &SRLevelTouch) -> Result<(), CollaboratorError>;
}

/// Alerting collaborator, called on phase changes and retirements
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, event: &EngineEvent) -> Result<(), CollaboratorError>;
}

/// Run a collaborator call under a deadline
pub async fn bounded<F>(limit: Duration, call: F) -> Result<(), CollaboratorError>
where
    F: std::future::Future<Output = Result<(), CollaboratorError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CollaboratorError::Timeout(limit))?
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    theses: RwLock<HashMap<PatternId, PatternThesisSnapshot>>,
    levels: RwLock<HashMap<LevelKey, SupportResistanceLevelSnapshot>>,
    touches: RwLock<Vec<SRLevelTouch>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thesis(&self, id: &PatternId) -> Option<PatternThesisSnapshot> {
        self.theses.read().await.get(id).cloned()
    }

    pub async fn level(&self, key: &LevelKey) -> Option<SupportResistanceLevelSnapshot> {
        self.levels.read().await.get(key).cloned()
    }

    pub async fn touch_count(&self) -> usize {
        self.touches.read().await.len()
    }
}

#[async_trait]
impl PatternStore for InMemoryStore {
    async fn save_thesis(&self, snapshot: &PatternThesisSnapshot) -> Result<(), CollaboratorError> {
        self.theses
            .write()
            .await
            .insert(snapshot.pattern_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn save_level(
        &self,
        snapshot: &SupportResistanceLevelSnapshot,
    ) -> Result<(), CollaboratorError> {
        self.levels
            .write()
            .await
            .insert(snapshot.key.clone(), snapshot.clone());
        Ok(())
    }

    async fn append_touch(&self, touch: &SRLevelTouch) -> Result<(), CollaboratorError> {
        self.touches.write().await.push(touch.clone());
        Ok(())
    }
}

/// Alert sink that writes alerts to the log
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, event: &EngineEvent) -> Result<(), CollaboratorError> {
        match event {
            EngineEvent::PhaseChanged {
                pattern_id,
                family,
                to,
                completion_percent,
                target_price,
                ..
            } => match target_price {
                Some(target) => tracing::warn!(
                    "🔔 {}: {} entered {} ({:.1}% complete, target ${:.2})",
                    pattern_id,
                    family,
                    to,
                    completion_percent,
                    target
                ),
                None => tracing::warn!(
                    "🔔 {}: {} entered {} ({:.1}% complete)",
                    pattern_id,
                    family,
                    to,
                    completion_percent
                ),
            },
            EngineEvent::PatternRetired { pattern_id, status, .. } => {
                tracing::warn!("🚨 {}: pattern retired ({:?})", pattern_id, status);
            }
            EngineEvent::LevelCreated { level } => {
                tracing::info!(
                    "{}: new {} level at ${:.2}",
                    level.key,
                    level.level_type,
                    level.price
                );
            }
            EngineEvent::LevelDeactivated { key, price, .. } => {
                tracing::info!("{}: level at ${:.2} deactivated", key, price);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Store double that fails writes for chosen patterns/levels and records the rest
    #[derive(Debug, Default)]
    pub struct FlakyStore {
        pub inner: InMemoryStore,
        failing_symbols: Mutex<HashSet<String>>,
        failing_levels: Mutex<HashSet<LevelKey>>,
        // 1-based index of the save_thesis call to refuse, 0 for none
        failing_thesis_write: AtomicUsize,
        thesis_writes: AtomicUsize,
        delay: Option<Duration>,
        // when non-empty, only these symbols are delayed
        slow_symbols: Mutex<HashSet<String>>,
    }

    impl FlakyStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn slow_symbol(&self, symbol: &str) {
            self.slow_symbols.lock().unwrap().insert(symbol.to_string());
        }

        pub fn fail_symbol(&self, symbol: &str) {
            self.failing_symbols.lock().unwrap().insert(symbol.to_string());
        }

        pub fn heal_symbol(&self, symbol: &str) {
            self.failing_symbols.lock().unwrap().remove(symbol);
        }

        pub fn fail_level(&self, key: &LevelKey) {
            self.failing_levels.lock().unwrap().insert(key.clone());
        }

        /// Refuse only the `n`th thesis write, counting from the first call
        pub fn fail_thesis_write(&self, n: usize) {
            self.failing_thesis_write.store(n, Ordering::SeqCst);
        }

        async fn pause(&self, symbol: &str) {
            let Some(delay) = self.delay else {
                return;
            };
            let slowed = {
                let slow = self.slow_symbols.lock().unwrap();
                slow.is_empty() || slow.contains(symbol)
            };
            if slowed {
                tokio::time::sleep(delay).await;
            }
        }

        fn check_symbol(&self, symbol: &str) -> Result<(), CollaboratorError> {
            if self.failing_symbols.lock().unwrap().contains(symbol) {
                return Err(CollaboratorError::Backend(format!("write refused for {symbol}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PatternStore for FlakyStore {
        async fn save_thesis(
            &self,
            snapshot: &PatternThesisSnapshot,
        ) -> Result<(), CollaboratorError> {
            self.pause(&snapshot.pattern_id.symbol).await;
            let call = self.thesis_writes.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.failing_thesis_write.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Backend(format!(
                    "write {call} refused for {}",
                    snapshot.pattern_id
                )));
            }
            self.check_symbol(&snapshot.pattern_id.symbol)?;
            self.inner.save_thesis(snapshot).await
        }

        async fn save_level(
            &self,
            snapshot: &SupportResistanceLevelSnapshot,
        ) -> Result<(), CollaboratorError> {
            self.pause(&snapshot.key.symbol).await;
            self.check_symbol(&snapshot.key.symbol)?;
            if self.failing_levels.lock().unwrap().contains(&snapshot.key) {
                return Err(CollaboratorError::Backend(format!(
                    "write refused for {}",
                    snapshot.key
                )));
            }
            self.inner.save_level(snapshot).await
        }

        async fn append_touch(&self, touch: &SRLevelTouch) -> Result<(), CollaboratorError> {
            self.pause(&touch.level.symbol).await;
            self.check_symbol(&touch.level.symbol)?;
            self.inner.append_touch(touch).await
        }
    }

    /// Alert sink that records every event it receives, or refuses them all
    /// while failing
    #[derive(Debug, Default, Clone)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<EngineEvent>>>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<EngineEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn notify(&self, event: &EngineEvent) -> Result<(), CollaboratorError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Backend("alert channel down".to_string()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_reports_timeouts() {
        let limit = Duration::from_millis(10);
        let result = bounded(limit, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn bounded_passes_errors_through() {
        let result = bounded(Duration::from_secs(1), async {
            Err(CollaboratorError::Backend("disk full".to_string()))
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Backend(msg)) if msg == "disk full"));
    }
}
