use std::collections::HashSet;

use chrono::{DateTime, TimeZone};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::adjustment::{self, ExcessDecision, SkipReason};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::models::{CalorieAdjustment, CalorieGoalState, GoalNotification};
use crate::storage::StateStorage;

const NOTIFICATION_CAPACITY: usize = 16;

/// How the state came to be in memory after [`GoalAdjustmentStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Nothing was stored yet; a default state was created and saved
    Initialized,
    /// The stored document was unreadable and has been replaced by a default state
    Reinitialized { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExcessOutcome {
    Created(CalorieAdjustment),
    Skipped(SkipReason),
}

/// Owns the goal state of one user and keeps its storage slot in sync.
///
/// Every mutating call persists before returning. Notifications produced
/// by [`reconcile`](Self::reconcile) are returned, kept as the pending
/// notification until dismissed, and broadcast to subscribers.
pub struct GoalAdjustmentStore<S> {
    storage: S,
    config: StoreConfig,
    state: CalorieGoalState,
    pending: Option<GoalNotification>,
    notifications: broadcast::Sender<GoalNotification>,
}

impl<S: StateStorage> GoalAdjustmentStore<S> {
    pub async fn load(storage: S) -> Result<(Self, LoadOutcome)> {
        Self::load_with(storage, StoreConfig::default()).await
    }

    pub async fn load_with(storage: S, config: StoreConfig) -> Result<(Self, LoadOutcome)> {
        check_base_goal(config.default_base_goal)
            .map_err(|e| Error::Validation(format!("default {}", e)))?;

        let decoded = match storage.read(&config.storage_key).await {
            Ok(raw) => raw.map(|raw| decode_state(&raw)),
            Err(Error::StorageCorruption(reason)) => Some(Err(Error::StorageCorruption(reason))),
            Err(e) => return Err(e),
        };
        let default_state = CalorieGoalState::new(config.default_base_goal);

        let (state, outcome) = match decoded {
            None => {
                info!(
                    base_goal = config.default_base_goal,
                    "no goal state stored, initializing"
                );
                (default_state, LoadOutcome::Initialized)
            }
            Some(Ok(state)) => (state, LoadOutcome::Loaded),
            Some(Err(e)) => {
                warn!(error = %e, "discarding stored goal state");
                (
                    default_state,
                    LoadOutcome::Reinitialized {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let store = Self {
            storage,
            config,
            state,
            pending: None,
            notifications,
        };

        if outcome != LoadOutcome::Loaded {
            store.persist().await?;
        }

        Ok((store, outcome))
    }

    /// Load and immediately reconcile against `now`.
    pub async fn open<Tz: TimeZone>(
        storage: S,
        now: &DateTime<Tz>,
    ) -> Result<(Self, LoadOutcome)> {
        let (mut store, outcome) = Self::load(storage).await?;
        store.reconcile(now).await?;
        Ok((store, outcome))
    }

    /// Expire and count down adjustments; returns the notice to show, if any.
    pub async fn reconcile<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
    ) -> Result<Option<GoalNotification>> {
        let pass = adjustment::reconcile(&self.state, now);
        if !pass.changed {
            return Ok(None);
        }

        debug!(
            expired = pass.expired.len(),
            active = pass.state.active_adjustments.len(),
            current_goal = pass.state.current_goal,
            "reconciled goal state"
        );

        self.state = pass.state;
        self.persist().await?;

        if let Some(notification) = pass.notification {
            self.pending = Some(notification);
            // No subscribers is fine; the pending slot still holds it
            let _ = self.notifications.send(notification);
        }

        Ok(pass.notification)
    }

    /// Record a day's total intake. At most one adjustment is created per calendar day.
    pub async fn register_excess<Tz: TimeZone>(
        &mut self,
        total_calories: i64,
        now: &DateTime<Tz>,
    ) -> Result<ExcessOutcome> {
        match adjustment::register_excess(&self.state, total_calories, now) {
            ExcessDecision::Adjusted { state, adjustment } => {
                info!(
                    excess = adjustment.excess_amount,
                    daily_reduction = adjustment.daily_reduction,
                    previous_goal = adjustment.previous_goal,
                    adjusted_goal = adjustment.adjusted_goal,
                    "calorie goal adjusted"
                );
                self.state = state;
                self.persist().await?;
                Ok(ExcessOutcome::Created(adjustment))
            }
            ExcessDecision::Skipped(reason) => {
                debug!(?reason, total_calories, "no adjustment created");
                Ok(ExcessOutcome::Skipped(reason))
            }
        }
    }

    /// Replace the base goal, discarding every in-flight adjustment.
    pub async fn set_base_goal(&mut self, base_goal: i64) -> Result<()> {
        check_base_goal(base_goal).map_err(Error::Validation)?;

        info!(
            base_goal,
            discarded = self.state.active_adjustments.len(),
            "base goal reset"
        );
        self.state = CalorieGoalState::new(base_goal);
        self.pending = None;
        self.persist().await
    }

    pub fn current_goal(&self) -> i64 {
        self.state.current_goal
    }

    pub fn base_goal(&self) -> i64 {
        self.state.base_goal
    }

    pub fn minimum_goal(&self) -> i64 {
        adjustment::calculate_minimum_goal(self.state.base_goal)
    }

    pub fn has_active_adjustments(&self) -> bool {
        !self.state.active_adjustments.is_empty()
    }

    pub fn state(&self) -> &CalorieGoalState {
        &self.state
    }

    pub fn pending_notification(&self) -> Option<GoalNotification> {
        self.pending
    }

    pub fn dismiss_notification(&mut self) -> Option<GoalNotification> {
        self.pending.take()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GoalNotification> {
        self.notifications.subscribe()
    }

    async fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.state)
            .map_err(|e| Error::Storage(format!("encoding goal state failed: {}", e)))?;
        self.storage.write(&self.config.storage_key, &raw).await
    }
}

fn decode_state(raw: &str) -> Result<CalorieGoalState> {
    let state: CalorieGoalState =
        serde_json::from_str(raw).map_err(|e| Error::StorageCorruption(e.to_string()))?;

    check_base_goal(state.base_goal).map_err(Error::StorageCorruption)?;

    let mut seen = HashSet::new();
    for adj in &state.active_adjustments {
        if !seen.insert(adj.id.clone()) {
            return Err(Error::StorageCorruption(format!(
                "duplicate adjustment id {}",
                adj.id
            )));
        }
        if adj.daily_reduction <= 0 || adj.daily_reduction % 10 != 0 {
            return Err(Error::StorageCorruption(format!(
                "adjustment {} has daily reduction {}, expected a positive multiple of 10",
                adj.id, adj.daily_reduction
            )));
        }
        if i64::from(adj.days_remaining) > adjustment::ADJUSTMENT_PERIOD_DAYS {
            return Err(Error::StorageCorruption(format!(
                "adjustment {} has {} days remaining",
                adj.id, adj.days_remaining
            )));
        }
    }

    Ok(state)
}

fn check_base_goal(base_goal: i64) -> std::result::Result<(), String> {
    if (1..=adjustment::MAXIMUM_BASE_GOAL).contains(&base_goal) {
        Ok(())
    } else {
        Err(format!(
            "base goal must be between 1 and {}, got {}",
            adjustment::MAXIMUM_BASE_GOAL,
            base_goal
        ))
    }
}
