use crate::Error;
use kube::config::{
    Config,
    KubeConfigOptions,
    Kubeconfig,
};
use std::path::Path;

/// The self-hosted control plane started by the bootstrap process.
pub const DEFAULT_WATCHED_PODS: &[&str] = &[
    "kube-system/pod-checkpointer",
    "kube-system/kube-apiserver",
    "kube-system/kube-scheduler",
    "kube-system/kube-controller-manager",
];

/// Builds a client from an explicit kubeconfig, a context of the default kubeconfig or, with neither, from the
/// inferred environment (in-cluster or `~/.kube/config`).
pub async fn client(kubeconfig: Option<&Path>, context: Option<String>) -> Result<kube::Client, Error> {
    let options = KubeConfigOptions {
        context,
        ..Default::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "loading kubeconfig");
            Config::from_custom_kubeconfig(Kubeconfig::read_from(path)?, &options).await?
        }
        None if options.context.is_some() => Config::from_kubeconfig(&options).await?,
        None => Config::infer().await?,
    };

    info!(cluster_url = %config.cluster_url, "connecting to cluster");
    Ok(kube::Client::try_from(config)?)
}
