use crate::{
    mirror::{
        MirrorError,
        ObjectMirror,
    },
    output::UserOutput,
    status::{
        self,
        ChangeTracker,
        NodeSnapshot,
        PodPhase,
        PodSnapshot,
    },
};
use k8s_openapi::api::core::v1::{
    Node,
    Pod,
};
use serde::Serialize;
use std::sync::Arc;

const CONDITION_TRUE: &str = "True";

/// Outcome of a single evaluation.
#[derive(Debug)]
pub enum Readiness {
    Ready,
    NotReady(String),
    /// The mirror could not be read. The next evaluation may succeed.
    TransientError(MirrorError),
}

/// Tracks whether the watched control plane pods are running and all nodes are ready.
pub struct StatusController {
    pods: Arc<dyn ObjectMirror<Pod>>,
    nodes: Arc<dyn ObjectMirror<Node>>,
    watch_pods: Vec<String>,
    output: Arc<dyn UserOutput>,
    last_pod_phases: ChangeTracker<PodSnapshot>,
    last_node_conditions: ChangeTracker<NodeSnapshot>,
}

impl StatusController {
    pub fn new(
        pods: Arc<dyn ObjectMirror<Pod>>,
        nodes: Arc<dyn ObjectMirror<Node>>,
        watch_pods: Vec<String>,
        output: Arc<dyn UserOutput>,
    ) -> Self {
        Self {
            pods,
            nodes,
            watch_pods,
            output,
            last_pod_phases: Default::default(),
            last_node_conditions: Default::default(),
        }
    }

    /// The polled predicate. Never fails, anything that goes wrong reads as "not running yet".
    pub fn all_running(&mut self) -> bool {
        match self.evaluate() {
            Readiness::Ready => true,
            Readiness::NotReady(reason) => {
                debug!("not ready: {reason}");
                false
            }
            Readiness::TransientError(err) => {
                info!("Error retrieving status: {err}");
                false
            }
        }
    }

    /// Pods first, nodes are only looked at once every watched pod is running.
    pub fn evaluate(&mut self) -> Readiness {
        match self.pods_readiness() {
            Readiness::Ready => self.nodes_readiness(),
            not_ready => not_ready,
        }
    }

    fn pods_readiness(&mut self) -> Readiness {
        let snapshot = match status::pod_status(self.pods.as_ref(), &self.watch_pods) {
            Ok(snapshot) => snapshot,
            Err(err) => return Readiness::TransientError(err),
        };

        let (changed, snapshot) = self.last_pod_phases.observe(snapshot);
        if changed {
            for (name, phase) in snapshot {
                self.output.write_line(&status::pod_status_line(name, *phase));
            }
        }

        match not_running(snapshot).as_slice() {
            [] => Readiness::Ready,
            pending => Readiness::NotReady(format!("pods not running: {}", pending.join(", "))),
        }
    }

    fn nodes_readiness(&mut self) -> Readiness {
        let snapshot = match status::node_status(self.nodes.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(err) => return Readiness::TransientError(err),
        };

        let (changed, snapshot) = self.last_node_conditions.observe(snapshot);
        if changed {
            for (name, condition) in snapshot {
                self.output.write_line(&status::node_status_line(name, condition));
            }
        }

        match not_ready(snapshot).as_slice() {
            [] => Readiness::Ready,
            pending => Readiness::NotReady(format!("nodes not ready: {}", pending.join(", "))),
        }
    }
}

fn not_running(pods: &PodSnapshot) -> Vec<&str> {
    pods.iter()
        .filter(|(_, phase)| **phase != PodPhase::Running)
        .map(|(name, _)| name.as_str())
        .collect()
}

fn not_ready(nodes: &NodeSnapshot) -> Vec<&str> {
    nodes
        .iter()
        .filter(|(_, condition)| condition.status != CONDITION_TRUE)
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Point in time view of both snapshots, without change tracking.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub pods: PodSnapshot,
    pub nodes: NodeSnapshot,
    pub all_running: bool,
}

impl StatusReport {
    pub fn collect(
        pods: &dyn ObjectMirror<Pod>,
        nodes: &dyn ObjectMirror<Node>,
        watch_pods: &[String],
    ) -> Result<Self, MirrorError> {
        let pods = status::pod_status(pods, watch_pods)?;
        let nodes = status::node_status(nodes)?;
        let all_running = not_running(&pods).is_empty() && not_ready(&nodes).is_empty();
        Ok(Self {
            pods,
            nodes,
            all_running,
        })
    }

    pub fn lines(&self) -> Vec<String> {
        let pods = self
            .pods
            .iter()
            .map(|(name, phase)| status::pod_status_line(name, *phase));
        let nodes = self
            .nodes
            .iter()
            .map(|(name, condition)| status::node_status_line(name, condition));
        pods.chain(nodes).collect()
    }
}
