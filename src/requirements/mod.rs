//! Resolves a Promise's `spec.requirements` against the other Promises
//! currently known to the cluster (§4.4). Pure and synchronous: the caller
//! is responsible for fetching snapshots of other Promises beforehand.

use kratix_types::{PromiseAvailability, PromiseRequirement, RequirementState, RequirementStatus};

pub const REQUIREMENTS_FULFILLED_CONDITION: &str = "RequirementsFulfilled";
pub const REASON_REQUIREMENTS_NOT_INSTALLED: &str = "RequirementsNotInstalled";
pub const MESSAGE_REQUIREMENTS_NOT_FULFILLED: &str = "Requirements not fulfilled";

/// The subset of another Promise's status needed to resolve a requirement on it.
#[derive(Debug, Clone)]
pub struct PromiseSnapshot {
    pub version: String,
    pub status: PromiseAvailability,
}

pub struct RequirementsResolution {
    pub statuses: Vec<RequirementStatus>,
    pub fulfilled: bool,
}

/// Resolve every requirement using `lookup` to find other Promises by name.
pub fn resolve<F>(requirements: &[PromiseRequirement], lookup: F) -> RequirementsResolution
where
    F: Fn(&str) -> Option<PromiseSnapshot>,
{
    let mut statuses = Vec::with_capacity(requirements.len());
    let mut fulfilled = true;

    for req in requirements {
        let state = match lookup(&req.name) {
            None => RequirementState::NotInstalled,
            Some(snapshot) => {
                if snapshot.version != req.version || snapshot.status != PromiseAvailability::Available {
                    RequirementState::NotInstalledAtVersion
                } else {
                    RequirementState::Installed
                }
            }
        };
        if state != RequirementState::Installed {
            fulfilled = false;
        }
        statuses.push(RequirementStatus {
            name: req.name.clone(),
            version: req.version.clone(),
            state,
        });
    }

    RequirementsResolution { statuses, fulfilled }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(map: &HashMap<&str, PromiseSnapshot>) -> impl Fn(&str) -> Option<PromiseSnapshot> + '_ {
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_promise_is_not_installed() {
        let reqs = vec![PromiseRequirement { name: "postgres".into(), version: "v1".into() }];
        let map = HashMap::new();
        let resolution = resolve(&reqs, lookup_from(&map));
        assert!(!resolution.fulfilled);
        assert_eq!(resolution.statuses[0].state, RequirementState::NotInstalled);
    }

    #[test]
    fn wrong_version_is_not_installed_at_version() {
        let reqs = vec![PromiseRequirement { name: "postgres".into(), version: "v2".into() }];
        let mut map = HashMap::new();
        map.insert("postgres", PromiseSnapshot { version: "v1".into(), status: PromiseAvailability::Available });
        let resolution = resolve(&reqs, lookup_from(&map));
        assert!(!resolution.fulfilled);
        assert_eq!(resolution.statuses[0].state, RequirementState::NotInstalledAtVersion);
    }

    #[test]
    fn matching_available_promise_is_installed() {
        let reqs = vec![PromiseRequirement { name: "postgres".into(), version: "v1".into() }];
        let mut map = HashMap::new();
        map.insert("postgres", PromiseSnapshot { version: "v1".into(), status: PromiseAvailability::Available });
        let resolution = resolve(&reqs, lookup_from(&map));
        assert!(resolution.fulfilled);
        assert_eq!(resolution.statuses[0].state, RequirementState::Installed);
    }

    #[test]
    fn no_requirements_is_trivially_fulfilled() {
        let resolution = resolve(&[], |_| None);
        assert!(resolution.fulfilled);
        assert!(resolution.statuses.is_empty());
    }
}
