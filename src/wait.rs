use crate::{
    mirror::{
        MirrorError,
        ReflectorMirror,
    },
    output::UserOutput,
    poll::{
        poll_until,
        PollError,
    },
    readiness::{
        StatusController,
        StatusReport,
    },
    Error,
};
use k8s_openapi::api::core::v1::{
    Node,
    Pod,
};
use kube::Api;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

/// Pod (all namespaces) and node mirrors sharing one cancellation token.
struct Mirrors {
    pods: Arc<ReflectorMirror<Pod>>,
    nodes: Arc<ReflectorMirror<Node>>,
    cancel: CancellationToken,
    tasks: [JoinHandle<()>; 2],
}

impl Mirrors {
    fn start(client: kube::Client, cancel: CancellationToken) -> Self {
        let (pods, pod_task) = ReflectorMirror::start(Api::<Pod>::all(client.clone()), cancel.clone());
        let (nodes, node_task) = ReflectorMirror::start(Api::<Node>::all(client), cancel.clone());
        Self {
            pods: Arc::new(pods),
            nodes: Arc::new(nodes),
            cancel,
            tasks: [pod_task, node_task],
        }
    }

    /// Resolves once both mirrors applied their first complete list.
    async fn wait_until_ready(&self) -> Result<(), MirrorError> {
        self.pods.wait_until_ready().await?;
        self.nodes.wait_until_ready().await
    }

    async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!("mirror task failed: {err}");
            }
        }
    }
}

/// Blocks until every watched pod is running and every node is ready, polling every `interval` for at most
/// `timeout`. Status lines and the final confirmation are written to `output`.
///
/// Polling starts once both mirrors listed the cluster, an unsynced mirror would report every pod as missing. The
/// initial list counts against `timeout`.
pub async fn wait_until_pods_running(
    client: kube::Client,
    pods: Vec<String>,
    timeout: Duration,
    interval: Duration,
    output: Arc<dyn UserOutput>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let start = Instant::now();
    let mirrors = Mirrors::start(client, shutdown.child_token());
    info!(?timeout, ?interval, "waiting for control plane");

    let synced = tokio::select! {
        _ = shutdown.cancelled() => Err(Error::Poll(PollError::Cancelled)),
        synced = tokio::time::timeout(timeout, mirrors.wait_until_ready()) => match synced {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Poll(PollError::Timeout(timeout))),
        },
    };
    if let Err(err) = synced {
        mirrors.stop().await;
        return Err(err);
    }
    debug!(elapsed = ?start.elapsed(), "mirrors synced");

    let mut controller = StatusController::new(mirrors.pods.clone(), mirrors.nodes.clone(), pods, output.clone());
    let result = poll_until(interval, timeout.saturating_sub(start.elapsed()), &shutdown, || {
        controller.all_running()
    })
    .await;
    mirrors.stop().await;
    result.map_err(|err| match err {
        PollError::Timeout(_) => PollError::Timeout(timeout),
        err => err,
    })?;

    output.write_line("All self-hosted control plane components successfully started");
    Ok(())
}

/// One-shot view of the watched pods and all nodes, taken once both mirrors completed their first list.
pub async fn current_status(client: kube::Client, pods: &[String], sync_timeout: Duration) -> Result<StatusReport, Error> {
    let mirrors = Mirrors::start(client, CancellationToken::new());

    let synced = tokio::time::timeout(sync_timeout, mirrors.wait_until_ready()).await;

    let report = match synced {
        Ok(Ok(())) => StatusReport::collect(mirrors.pods.as_ref(), mirrors.nodes.as_ref(), pods).map_err(Error::from),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(Error::SyncTimeout(sync_timeout)),
    };
    mirrors.stop().await;
    report
}
