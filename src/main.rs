use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patternwatch::business_logic::config::{LevelConfig, TrackerConfig};
use patternwatch::business_logic::schema::PatternFamily;
use patternwatch::business_logic::thesis::ComponentUpdate;
use patternwatch::models::level::TouchEvent;
use patternwatch::models::pattern::{PatternGeometry, PatternId};
use patternwatch::services::events::EventHub;
use patternwatch::services::level_tracker::LevelTracker;
use patternwatch::services::store::{InMemoryStore, LogAlertSink};
use patternwatch::services::summary::{build_summary, describe_nearest};
use patternwatch::services::thesis_tracker::ThesisTracker;

/// One step of a replay file
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ReplayStep {
    Register {
        pattern: PatternId,
        family: PatternFamily,
        #[serde(default)]
        geometry: PatternGeometry,
        at: DateTime<Utc>,
    },
    Update {
        pattern: PatternId,
        update: ComponentUpdate,
        at: DateTime<Utc>,
    },
    Price {
        pattern: PatternId,
        price: f64,
        at: DateTime<Utc>,
    },
    Touch {
        touch: TouchEvent,
    },
    Sweep {
        max_age_hours: Option<f64>,
        at: DateTime<Utc>,
    },
    Nearest {
        symbol: String,
        price: f64,
    },
}

struct Engine {
    theses: ThesisTracker,
    levels: LevelTracker,
}

impl Engine {
    async fn run(&self, step: ReplayStep) -> anyhow::Result<()> {
        match step {
            ReplayStep::Register {
                pattern,
                family,
                geometry,
                at,
            } => {
                self.theses.register(pattern, family, geometry, at).await?;
            }
            ReplayStep::Update { pattern, update, at } => {
                let snapshot = self.theses.apply_update(&pattern, &update, at).await?;
                tracing::debug!("{}", build_summary(&snapshot));
            }
            ReplayStep::Price { pattern, price, at } => {
                let snapshot = self.theses.observe_price(&pattern, price, at).await?;
                tracing::debug!("{}", build_summary(&snapshot));
            }
            ReplayStep::Touch { touch } => {
                let update = self.levels.ingest(&touch).await?;
                tracing::debug!(
                    "[{}] touch at ${:.2} -> {} ({:?})",
                    touch.symbol,
                    touch.price,
                    update.level.key,
                    update.outcome
                );
            }
            ReplayStep::Sweep { max_age_hours, at } => {
                let max_age = max_age_hours.unwrap_or(self.levels.config().max_age_hours);
                let report = self.levels.sweep(max_age, at).await;
                tracing::info!(
                    "Sweep: {} deactivated, {} refreshed, {} failed",
                    report.deactivated.len(),
                    report.refreshed,
                    report.failures.len()
                );
                for failure in &report.failures {
                    tracing::warn!("Sweep failed for {}: {}", failure.key, failure.error);
                }
            }
            ReplayStep::Nearest { symbol, price } => {
                let nearest = self.levels.find_nearest(&symbol, price).await;
                tracing::info!("{}", describe_nearest(&symbol, price, &nearest));
            }
        }
        Ok(())
    }
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "patternwatch=info".into());

    match std::env::var("PATTERNWATCH_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "patternwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();

    let path = std::env::args()
        .nth(1)
        .context("usage: patternwatch <replay.json>")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path))?;
    let steps: Vec<ReplayStep> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;

    let tracker_config = TrackerConfig::default();
    let hub = EventHub::new(tracker_config.event_capacity);
    let store = Arc::new(InMemoryStore::new());
    let alerts = Arc::new(LogAlertSink);

    let mut events = Box::pin(hub.stream());
    let listener = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => tracing::debug!("[{}] event {}", event.symbol(), line),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        }
    });

    let engine = Engine {
        theses: ThesisTracker::new(
            store.clone(),
            alerts.clone(),
            hub.clone(),
            tracker_config.clone(),
        ),
        levels: LevelTracker::new(
            LevelConfig::default(),
            tracker_config,
            store,
            alerts,
            hub.clone(),
        )?,
    };

    tracing::info!("Replaying {} steps from {}", steps.len(), path);
    let mut failed = 0usize;
    for (index, step) in steps.into_iter().enumerate() {
        if let Err(e) = engine.run(step).await {
            failed += 1;
            tracing::error!("Step {} failed: {:#}", index + 1, e);
        }
    }

    let now = Utc::now();
    for snapshot in engine.theses.snapshots(now).await {
        tracing::info!("{}", build_summary(&snapshot));
    }
    tracing::info!("Replay finished, {} step(s) failed", failed);

    drop(engine);
    drop(hub);
    let _ = listener.await;
    Ok(())
}
