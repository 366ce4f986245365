//! Upserts a named condition into a `Vec<Condition>`, matching the
//! set-or-replace-by-type semantics every Kubernetes status block expects.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// Insert or replace the condition named `condition_type`. The `lastTransitionTime`
/// only advances when `status` actually changes, per the usual convention.
pub fn upsert(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    let now = Time(Utc::now());

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition_type) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
        return;
    }

    conditions.push(Condition {
        type_: condition_type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: now,
        observed_generation,
    });
}

pub fn get<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == condition_type)
}

pub fn is_true(conditions: &[Condition], condition_type: &str) -> bool {
    get(conditions, condition_type).map(|c| c.status == "True").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_new_condition() {
        let mut conditions = Vec::new();
        upsert(&mut conditions, "Ready", "True", "AllGood", "ready", Some(1));
        assert_eq!(conditions.len(), 1);
        assert!(is_true(&conditions, "Ready"));
    }

    #[test]
    fn replaces_existing_condition_in_place() {
        let mut conditions = Vec::new();
        upsert(&mut conditions, "Ready", "False", "NotYet", "waiting", Some(1));
        let first_transition = conditions[0].last_transition_time.clone();

        upsert(&mut conditions, "Ready", "False", "StillNotYet", "still waiting", Some(2));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, "StillNotYet");
        assert_eq!(conditions[0].last_transition_time, first_transition);

        upsert(&mut conditions, "Ready", "True", "Done", "ready", Some(3));
        assert_eq!(conditions.len(), 1);
        assert!(is_true(&conditions, "Ready"));
    }
}
