//! Pure decision functions of the goal auto-adjustment engine.
//!
//! Nothing here touches storage or the clock: every function takes the state
//! and "now" explicitly and returns the next state plus whatever should be
//! surfaced to the user. Calendar-day and hour-of-day checks are evaluated in
//! the time zone carried by `now`.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use uuid::Uuid;

use crate::models::{CalorieAdjustment, CalorieGoalState, GoalNotification};

/// Smallest overage (kcal) that creates an adjustment.
pub const MINIMUM_EXCESS_THRESHOLD: i64 = 280;

/// Number of days an adjustment stays active.
pub const ADJUSTMENT_PERIOD_DAYS: i64 = 7;

/// Floor of the effective goal, as a percentage of the base goal.
pub const MINIMUM_GOAL_PERCENT: i64 = 85;

/// Local hour from which a new day's adjustment notice may be shown.
pub const ADJUSTMENT_START_HOUR: u32 = 6;

/// Base goal used when no state has been stored yet.
pub const DEFAULT_BASE_GOAL: i64 = 2000;

/// Largest base goal accepted from callers or storage.
pub const MAXIMUM_BASE_GOAL: i64 = 100_000;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Round to the nearest multiple of 10, halves rounding up.
pub fn round_to_ten(value: f64) -> i64 {
    ((value / 10.0 + 0.5).floor() as i64).saturating_mul(10)
}

/// 85% of the base goal, rounded up to the next multiple of 10.
pub fn calculate_minimum_goal(base_goal: i64) -> i64 {
    base_goal
        .saturating_mul(MINIMUM_GOAL_PERCENT)
        .saturating_add(999)
        .div_euclid(1000)
        * 10
}

/// The goal implied by the base goal and every active reduction.
pub fn effective_goal(state: &CalorieGoalState) -> i64 {
    let reduced = state.base_goal.saturating_sub(state.total_daily_reduction());
    reduced.max(calculate_minimum_goal(state.base_goal))
}

pub fn is_same_day<Tz: TimeZone>(instant: &DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    instant.with_timezone(&now.timezone()).date_naive() == now.date_naive()
}

/// True once `now` is on a later calendar day than `last_excess` and past 06:00.
pub fn is_valid_adjustment_time<Tz: TimeZone>(
    last_excess: &DateTime<Utc>,
    now: &DateTime<Tz>,
) -> bool {
    !is_same_day(last_excess, now) && now.hour() >= ADJUSTMENT_START_HOUR
}

/// Whole elapsed days since `start`, never negative.
pub fn days_since_start<Tz: TimeZone>(start: &DateTime<Utc>, now: &DateTime<Tz>) -> i64 {
    let elapsed = now.with_timezone(&Utc) - *start;
    elapsed.num_milliseconds().div_euclid(MILLIS_PER_DAY).max(0)
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub state: CalorieGoalState,
    pub changed: bool,
    /// At most one notice per pass; completion wins over a new adjustment
    pub notification: Option<GoalNotification>,
    pub expired: Vec<CalorieAdjustment>,
}

/// Expire finished adjustments, count down the rest and decide which notice to show.
pub fn reconcile<Tz: TimeZone>(state: &CalorieGoalState, now: &DateTime<Tz>) -> Reconciliation {
    let mut next = state.clone();
    let mut changed = false;
    let mut show_completion = false;
    let mut show_adjustment = false;
    let mut expired = Vec::new();

    let notice_due = state
        .last_excess_date
        .as_ref()
        .is_some_and(|last| is_valid_adjustment_time(last, now));

    let mut kept = Vec::with_capacity(next.active_adjustments.len());
    for mut adj in next.active_adjustments.drain(..) {
        let days = days_since_start(&adj.start_date, now);

        if days >= ADJUSTMENT_PERIOD_DAYS + 1 {
            tracing::debug!(id = %adj.id, days, "adjustment expired");
            changed = true;
            show_completion = true;
            expired.push(adj);
            continue;
        }

        let days_remaining = (ADJUSTMENT_PERIOD_DAYS - days) as u32;
        if adj.days_remaining != days_remaining {
            adj.days_remaining = days_remaining;
            changed = true;
        }

        if !adj.notification_shown && notice_due {
            adj.notification_shown = true;
            show_adjustment = true;
            changed = true;
        }

        kept.push(adj);
    }
    next.active_adjustments = kept;

    let goal = effective_goal(&next);
    if next.current_goal != goal {
        next.current_goal = goal;
        changed = true;
    }

    let notification = if show_completion {
        Some(GoalNotification::AdjustmentCompleted {
            current_goal: next.current_goal,
        })
    } else if show_adjustment {
        Some(GoalNotification::AdjustmentApplied {
            current_goal: next.current_goal,
        })
    } else {
        None
    };

    Reconciliation {
        state: next,
        changed,
        notification,
        expired,
    }
}

/// Why an excess did not create an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BelowThreshold { excess: i64 },
    /// Only the first qualifying excess of a calendar day counts
    AlreadyProcessedToday,
    /// The effective goal already sits on the floor
    AtFloor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExcessDecision {
    Adjusted {
        state: CalorieGoalState,
        adjustment: CalorieAdjustment,
    },
    Skipped(SkipReason),
}

/// Decide whether a day's intake creates a new adjustment.
pub fn register_excess<Tz: TimeZone>(
    state: &CalorieGoalState,
    total_calories: i64,
    now: &DateTime<Tz>,
) -> ExcessDecision {
    let excess = total_calories.saturating_sub(state.current_goal);
    if excess < MINIMUM_EXCESS_THRESHOLD {
        return ExcessDecision::Skipped(SkipReason::BelowThreshold { excess });
    }

    if let Some(ref last) = state.last_excess_date {
        if is_same_day(last, now) {
            return ExcessDecision::Skipped(SkipReason::AlreadyProcessedToday);
        }
    }

    let daily_reduction = round_to_ten(excess as f64 / ADJUSTMENT_PERIOD_DAYS as f64);
    let minimum_goal = calculate_minimum_goal(state.base_goal);

    let mut new_goal = state.current_goal.saturating_sub(daily_reduction);
    if new_goal < minimum_goal {
        if state.current_goal <= minimum_goal {
            return ExcessDecision::Skipped(SkipReason::AtFloor);
        }
        new_goal = minimum_goal;
    }

    let started = now.with_timezone(&Utc);
    let adjustment = CalorieAdjustment {
        id: Uuid::now_v7().to_string(),
        start_date: started,
        excess_amount: excess,
        daily_reduction,
        days_remaining: ADJUSTMENT_PERIOD_DAYS as u32,
        previous_goal: state.current_goal,
        adjusted_goal: new_goal,
        notification_shown: false,
    };

    let mut next = state.clone();
    next.active_adjustments.push(adjustment.clone());
    next.current_goal = new_goal;
    next.last_excess_date = Some(started);

    ExcessDecision::Adjusted {
        state: next,
        adjustment,
    }
}
