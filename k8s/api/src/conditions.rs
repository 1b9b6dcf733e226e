//! Status-condition helpers shared by C2–C5, preserving `lastTransitionTime`
//! across reconciliations where the condition's `status` is unchanged (§8).

use crate::Condition;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

pub const READY: &str = "Ready";
pub const DNS_SYNCED: &str = "DNSSynced";

/// Upserts `type_` into `conditions`, preserving `lastTransitionTime` when
/// the condition already exists with the same `status`.
pub fn set(conditions: &mut Vec<Condition>, type_: &str, status: bool, reason: &str, message: impl Into<String>) {
    let status_str = if status { "True" } else { "False" }.to_string();
    let message = message.into();
    let now = Time(Utc::now());

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status_str {
            existing.last_transition_time = now;
        }
        existing.status = status_str;
        existing.reason = reason.to_string();
        existing.message = message;
        return;
    }

    conditions.push(Condition {
        last_transition_time: now,
        message,
        observed_generation: None,
        reason: reason.to_string(),
        status: status_str,
        type_: type_.to_string(),
    });
}

/// True if `conditions` has `type_` set with status `True`.
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.type_ == type_)
        .is_some_and(|c| c.status == "True")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_transition_time_when_status_unchanged() {
        let mut conditions = Vec::new();
        set(&mut conditions, READY, true, "ReconcileSucceeded", "ok");
        let first = conditions[0].last_transition_time.clone();

        std::thread::sleep(std::time::Duration::from_millis(5));
        set(&mut conditions, READY, true, "ReconcileSucceeded", "ok again");

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first);
        assert_eq!(conditions[0].message, "ok again");
    }

    #[test]
    fn bumps_transition_time_when_status_changes() {
        let mut conditions = Vec::new();
        set(&mut conditions, READY, true, "ReconcileSucceeded", "ok");
        let first = conditions[0].last_transition_time.clone();

        std::thread::sleep(std::time::Duration::from_millis(5));
        set(&mut conditions, READY, false, "SourceUnavailable", "down");

        assert_ne!(conditions[0].last_transition_time, first);
        assert!(!is_true(&conditions, READY));
    }
}
