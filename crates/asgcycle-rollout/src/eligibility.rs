//! Eligibility — which group members are due for replacement.

use std::collections::BTreeSet;

use asgcycle_core::{InstanceId, InstanceMembership};

/// Candidates for replacement, sorted ascending by id with no duplicates.
///
/// An instance qualifies when it is alive (launching or in service), is
/// not on `current_launch_config` (unless `force`), and is not in
/// `exclude`. Pure: the same inputs always give the same output.
pub fn eligible_instances(
    memberships: &[InstanceMembership],
    current_launch_config: &str,
    force: bool,
    exclude: &BTreeSet<InstanceId>,
) -> Vec<InstanceId> {
    memberships
        .iter()
        .filter(|m| m.lifecycle_state.is_alive())
        .filter(|m| force || m.launch_config_name.as_deref() != Some(current_launch_config))
        .filter(|m| !exclude.contains(&m.instance_id))
        .map(|m| m.instance_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgcycle_core::LifecycleState;

    fn member(id: &str, state: LifecycleState, lc: Option<&str>) -> InstanceMembership {
        InstanceMembership {
            instance_id: id.to_string(),
            lifecycle_state: state,
            launch_config_name: lc.map(str::to_string),
        }
    }

    fn fleet() -> Vec<InstanceMembership> {
        vec![
            member("i-09", LifecycleState::InService, Some("lc-v1")),
            member("i-03", LifecycleState::InService, Some("lc-v2")),
            member("i-05", LifecycleState::Pending, Some("lc-v1")),
            member("i-01", LifecycleState::Terminating, Some("lc-v1")),
            member("i-07", LifecycleState::Quarantined, Some("lc-v1")),
            member("i-02", LifecycleState::Standby, Some("lc-v1")),
            member("i-04", LifecycleState::InService, None),
        ]
    }

    #[test]
    fn stale_alive_instances_sorted() {
        let ids = eligible_instances(&fleet(), "lc-v2", false, &BTreeSet::new());
        assert_eq!(ids, vec!["i-04", "i-05", "i-07", "i-09"]);
    }

    #[test]
    fn force_includes_current() {
        let ids = eligible_instances(&fleet(), "lc-v2", true, &BTreeSet::new());
        assert_eq!(ids, vec!["i-03", "i-04", "i-05", "i-07", "i-09"]);
    }

    #[test]
    fn leaving_instances_never_eligible() {
        let ids = eligible_instances(&fleet(), "lc-v2", true, &BTreeSet::new());
        assert!(!ids.contains(&"i-01".to_string()));
        assert!(!ids.contains(&"i-02".to_string()));
    }

    #[test]
    fn excluded_ids_skipped() {
        let exclude: BTreeSet<InstanceId> = ["i-05".to_string(), "i-03".to_string()].into();
        let ids = eligible_instances(&fleet(), "lc-v2", true, &exclude);
        assert_eq!(ids, vec!["i-04", "i-07", "i-09"]);
    }

    #[test]
    fn duplicates_collapsed() {
        let mut members = fleet();
        members.push(member("i-09", LifecycleState::InService, Some("lc-v1")));
        let ids = eligible_instances(&members, "lc-v2", false, &BTreeSet::new());
        assert_eq!(ids, vec!["i-04", "i-05", "i-07", "i-09"]);
    }

    #[test]
    fn idempotent() {
        let members = fleet();
        let exclude = BTreeSet::new();
        let first = eligible_instances(&members, "lc-v2", false, &exclude);
        let second = eligible_instances(&members, "lc-v2", false, &exclude);
        assert_eq!(first, second);
    }

    #[test]
    fn all_current_is_empty() {
        let members = vec![
            member("i-1", LifecycleState::InService, Some("lc-v2")),
            member("i-2", LifecycleState::Pending, Some("lc-v2")),
        ];
        assert!(eligible_instances(&members, "lc-v2", false, &BTreeSet::new()).is_empty());
    }
}
