use crate::{
    mirror::MirrorError,
    poll::PollError,
};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("error while checking pod status: {0}")]
    Poll(#[from] PollError),

    #[error("resources not listed within {0:?}")]
    SyncTimeout(Duration),

    #[error("failed to read mirrored resources: {0}")]
    Mirror(#[from] MirrorError),
}
