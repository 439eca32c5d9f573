// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! State transitions over the Lumigo status.
//!
//! An instance starts out Pending (no conditions) and moves between Active and Error
//! on every reconcile. Active and Error are mutually exclusive: setting one always
//! resets the other.

use chrono::{DateTime, Utc};

use crate::constants::reasons;
use crate::types::{Condition, ConditionState, ConditionType, LumigoStatus};

/// Set Error=True with the given reason and message, and Active=False.
///
/// Re-setting an identical error only refreshes `lastUpdateTime`.
pub fn set_error(status: &mut LumigoStatus, reason: &str, message: &str, now: DateTime<Utc>) {
    upsert(
        &mut status.error_condition,
        ConditionType::Error,
        ConditionState::True,
        reason,
        message,
        now,
    );
    upsert(
        &mut status.active_condition,
        ConditionType::Active,
        ConditionState::False,
        reason,
        message,
        now,
    );
    status.active = false;
}

/// Set Active=True and drop the Error condition entirely.
pub fn set_active(status: &mut LumigoStatus, now: DateTime<Utc>) {
    upsert(
        &mut status.active_condition,
        ConditionType::Active,
        ConditionState::True,
        reasons::ACTIVE,
        "Lumigo is ready",
        now,
    );
    status.error_condition = None;
    status.active = true;
}

pub fn is_active(status: Option<&LumigoStatus>) -> bool {
    status
        .and_then(|s| s.active_condition.as_ref())
        .is_some_and(|c| c.status == ConditionState::True)
}

/// Whether the Error condition is set, and its message
pub fn has_error(status: Option<&LumigoStatus>) -> (bool, String) {
    match status.and_then(|s| s.error_condition.as_ref()) {
        Some(c) if c.status == ConditionState::True => (true, c.message.clone()),
        _ => (false, String::new()),
    }
}

/// Equal apart from `lastUpdateTime`
pub fn same_state(a: &LumigoStatus, b: &LumigoStatus) -> bool {
    fn strip(c: &Option<Condition>) -> Option<(ConditionState, &str, &str, DateTime<Utc>)> {
        c.as_ref()
            .map(|c| (c.status, c.reason.as_str(), c.message.as_str(), c.last_transition_time))
    }

    a.active == b.active
        && a.existing_resources_instrumented == b.existing_resources_instrumented
        && strip(&a.active_condition) == strip(&b.active_condition)
        && strip(&a.error_condition) == strip(&b.error_condition)
}

/// Most recent `lastUpdateTime` across conditions
pub fn last_update(status: &LumigoStatus) -> Option<DateTime<Utc>> {
    [&status.active_condition, &status.error_condition]
        .into_iter()
        .flatten()
        .map(|c| c.last_update_time)
        .max()
}

fn upsert(
    slot: &mut Option<Condition>,
    condition_type: ConditionType,
    state: ConditionState,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    let last_transition_time = match slot {
        Some(existing) if existing.status == state => existing.last_transition_time,
        _ => now,
    };

    *slot = Some(Condition {
        condition_type,
        status: state,
        reason: reason.to_string(),
        message: message.to_string(),
        last_update_time: now,
        last_transition_time,
    });
}
