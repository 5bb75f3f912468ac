use crate::mirror::{
    MirrorError,
    ObjectMirror,
};
use chrono::SecondsFormat;
use k8s_openapi::{
    api::core::v1::{
        Node,
        NodeCondition,
        Pod,
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt,
};

pub const NODE_READY: &str = "Ready";

/// Phase of a watched pod. `DoesNotExist` marks a watched name with no matching pod in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
    DoesNotExist,
}

impl PodPhase {
    /// Missing or unrecognized phases are `Unknown`.
    pub fn of(pod: &Pod) -> Self {
        pod.status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .and_then(|phase| phase.parse().ok())
            .unwrap_or(PodPhase::Unknown)
    }
}

impl std::str::FromStr for PodPhase {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PodPhase::Pending),
            "Running" => Ok(PodPhase::Running),
            "Succeeded" => Ok(PodPhase::Succeeded),
            "Failed" => Ok(PodPhase::Failed),
            "Unknown" => Ok(PodPhase::Unknown),
            "DoesNotExist" => Ok(PodPhase::DoesNotExist),
            s => Err(eyre::eyre!("Invalid PodPhase: {s:?}")),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
            PodPhase::DoesNotExist => "DoesNotExist",
        };
        f.write_str(s)
    }
}

/// Resolved pod key -> phase.
pub type PodSnapshot = BTreeMap<String, PodPhase>;

/// Node name -> its Ready condition.
pub type NodeSnapshot = BTreeMap<String, NodeCondition>;

/// Phase of every watched pod.
///
/// Pod names carry a generated suffix, so a watched name resolves to the first mirror key it is a prefix of. With
/// several candidates the mirror's key order decides. An unresolved name is looked up as is and usually ends up as
/// `DoesNotExist`.
pub fn pod_status(mirror: &dyn ObjectMirror<Pod>, watched: &[String]) -> Result<PodSnapshot, MirrorError> {
    let keys = mirror.list_keys();
    let mut status = PodSnapshot::new();

    for watched_pod in watched {
        let key = keys
            .iter()
            .find(|key| key.starts_with(watched_pod.as_str()))
            .unwrap_or(watched_pod);

        let phase = match mirror.get_by_key(key)? {
            Some(pod) => PodPhase::of(&pod),
            None => PodPhase::DoesNotExist,
        };
        trace!(%watched_pod, %key, %phase, "resolved watched pod");
        status.insert(key.clone(), phase);
    }

    Ok(status)
}

/// Ready condition of every mirrored node. Nodes that do not report one are left out.
pub fn node_status(mirror: &dyn ObjectMirror<Node>) -> Result<NodeSnapshot, MirrorError> {
    let mut status = NodeSnapshot::new();

    for node in mirror.list() {
        let Some(name) = node.metadata.name.as_deref() else {
            warn!("Node has no name: {:?}", node.metadata);
            continue;
        };
        if let Some(condition) = ready_condition(&node) {
            status.insert(name.to_string(), condition.clone());
        }
    }

    Ok(status)
}

fn ready_condition(node: &Node) -> Option<&NodeCondition> {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|condition| condition.type_ == NODE_READY))
}

pub fn pod_status_line(name: &str, phase: PodPhase) -> String {
    format!("\tPod Status:{name:>24}\t{phase}")
}

pub fn node_status_line(name: &str, condition: &NodeCondition) -> String {
    format!("\tNode Conditions:{name:>24}\t{}", describe_condition(condition))
}

fn describe_condition(condition: &NodeCondition) -> String {
    let reason = condition
        .reason
        .as_deref()
        .filter(|reason| !reason.is_empty())
        .map(|reason| format!(" ({reason})"))
        .unwrap_or_default();
    let since = condition
        .last_transition_time
        .as_ref()
        .map(|Time(at)| format!(" since {}", at.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or_default();
    format!("{}={}{reason}{since}", condition.type_, condition.status)
}

/// Remembers the previous snapshot so unchanged snapshots are not reported again.
#[derive(Debug)]
pub struct ChangeTracker<S> {
    last: Option<S>,
}

impl<S> Default for ChangeTracker<S> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<S: PartialEq> ChangeTracker<S> {
    /// Stores `snapshot` as the new last value. Returns whether it differs from the previous one, the very first
    /// snapshot counts as changed.
    pub fn observe(&mut self, snapshot: S) -> (bool, &S) {
        let changed = self.last.as_ref() != Some(&snapshot);
        let last: &S = self.last.insert(snapshot);
        (changed, last)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use k8s_openapi::api::core::v1::{
        Node,
        NodeCondition,
        NodeStatus,
        Pod,
        PodStatus,
    };
    use kube::api::ObjectMeta;

    pub(crate) fn pod(name: &str, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub(crate) fn condition(type_: &str, status: &str) -> NodeCondition {
        NodeCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn node(name: &str, conditions: Vec<NodeCondition>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(conditions),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        fixtures::*,
        *,
    };
    use crate::mirror::testing::{
        BrokenMirror,
        MemoryMirror,
    };
    use chrono::{
        TimeZone as _,
        Utc,
    };

    fn watched(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn phase_parsing() {
        assert_eq!(PodPhase::of(&pod("a", "Running")), PodPhase::Running);
        assert_eq!(PodPhase::of(&pod("a", "Pending")), PodPhase::Pending);
        assert_eq!(PodPhase::of(&pod("a", "Weird")), PodPhase::Unknown);
        assert_eq!(PodPhase::of(&Pod::default()), PodPhase::Unknown);
        assert_eq!("DoesNotExist".parse::<PodPhase>().unwrap(), PodPhase::DoesNotExist);
    }

    #[test]
    fn watched_name_resolves_by_prefix() {
        let mirror = MemoryMirror::new()
            .with("etcd-abcde", pod("etcd-abcde", "Running"))
            .with("kube-scheduler-xyz", pod("kube-scheduler-xyz", "Pending"));

        let status = pod_status(&mirror, &watched(&["etcd"])).unwrap();

        assert_eq!(status, PodSnapshot::from([("etcd-abcde".to_string(), PodPhase::Running)]));
    }

    #[test]
    fn missing_pod_does_not_exist() {
        let mirror = MemoryMirror::new().with("etcd-abcde", pod("etcd-abcde", "Running"));

        let status = pod_status(&mirror, &watched(&["missing-pod"])).unwrap();

        assert_eq!(status, PodSnapshot::from([("missing-pod".to_string(), PodPhase::DoesNotExist)]));
    }

    #[test]
    fn ambiguous_prefix_takes_first_key_in_mirror_order() {
        let mirror = MemoryMirror::new()
            .with("kube-system/kube-apiserver-2", pod("kube-apiserver-2", "Pending"))
            .with("kube-system/kube-apiserver-1", pod("kube-apiserver-1", "Running"));

        let status = pod_status(&mirror, &watched(&["kube-system/kube-apiserver"])).unwrap();

        assert_eq!(
            status,
            PodSnapshot::from([("kube-system/kube-apiserver-2".to_string(), PodPhase::Pending)])
        );
    }

    #[test]
    fn lookup_errors_propagate() {
        let mirror = BrokenMirror {
            keys: vec!["etcd-1".to_string()],
        };
        assert!(pod_status(&mirror, &watched(&["etcd"])).is_err());
    }

    #[test]
    fn node_status_keeps_first_ready_condition() {
        let mirror = MemoryMirror::new()
            .with(
                "node1",
                node(
                    "node1",
                    vec![
                        condition("MemoryPressure", "False"),
                        condition("Ready", "True"),
                        condition("Ready", "False"),
                    ],
                ),
            )
            .with("node2", node("node2", vec![condition("DiskPressure", "False")]));

        let status = node_status(&mirror).unwrap();

        assert_eq!(status.len(), 1);
        assert_eq!(status["node1"], condition("Ready", "True"));
    }

    #[test]
    fn report_lines() {
        assert_eq!(
            pod_status_line("etcd-1", PodPhase::Running),
            "\tPod Status:                  etcd-1\tRunning"
        );

        let mut ready = condition("Ready", "False");
        ready.reason = Some("KubeletNotReady".to_string());
        ready.last_transition_time = Some(Time(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        assert_eq!(
            node_status_line("node1", &ready),
            "\tNode Conditions:                   node1\tReady=False (KubeletNotReady) since 2024-05-01T12:00:00Z"
        );
    }

    #[test]
    fn change_tracker_reports_first_and_changed_snapshots() {
        let mut tracker = ChangeTracker::<PodSnapshot>::default();
        let running = PodSnapshot::from([("etcd-1".to_string(), PodPhase::Running)]);
        let pending = PodSnapshot::from([("etcd-1".to_string(), PodPhase::Pending)]);

        assert!(tracker.observe(pending.clone()).0);
        assert!(!tracker.observe(pending.clone()).0);
        assert_eq!(tracker.observe(running.clone()), (true, &running));
        assert_eq!(tracker.observe(running.clone()), (false, &running));
    }
}
