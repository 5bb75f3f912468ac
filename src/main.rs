#[macro_use]
extern crate tracing;

use bootstrap_status::{
    config,
    output::{
        Stdout,
        UserOutput as _,
    },
    wait,
};
use clap::Parser;
use eyre::Result;
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
enum Args {
    /// Block until the control plane pods are running and all nodes are ready
    Wait(ArgsWait),
    /// Print the current pod and node status once
    Status(ArgsStatus),
}

#[derive(Parser)]
struct ArgsCluster {
    #[clap(long, help = "Path to a kubeconfig. If not set, the config is inferred from KUBECONFIG or the cluster")]
    kubeconfig: Option<PathBuf>,

    #[clap(long, env = "KUBE_CONTEXT", help = "Kubeconfig context to use")]
    context: Option<String>,

    #[clap(
        long,
        env = "WATCHED_PODS",
        value_delimiter = ',',
        default_values_t = config::DEFAULT_WATCHED_PODS.iter().map(|pod| pod.to_string()).collect::<Vec<String>>(),
        help = "Pods to watch, `namespace/name` prefixes"
    )]
    pods: Vec<String>,
}

#[derive(Parser)]
struct ArgsWait {
    #[clap(flatten)]
    cluster: ArgsCluster,

    #[clap(
        long,
        env = "WAIT_TIMEOUT",
        help = "Give up after this long",
        default_value = "20m",
        value_parser = humantime::parse_duration
    )]
    timeout: Duration,

    #[clap(
        long,
        env = "POLL_INTERVAL",
        help = "Time between status checks",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    interval: Duration,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Yaml,
    Json,
}

#[derive(Parser)]
struct ArgsStatus {
    #[clap(flatten)]
    cluster: ArgsCluster,

    #[clap(
        long,
        env = "SYNC_TIMEOUT",
        help = "How long to wait for the initial pod and node list",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    timeout: Duration,

    #[clap(long, short, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().expect("color_eyre init");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Args::parse() {
        Args::Wait(args) => run_wait(args).await?,
        Args::Status(args) => run_status(args).await?,
    }

    Ok(())
}

async fn run_wait(
    ArgsWait {
        cluster,
        timeout,
        interval,
    }: ArgsWait,
) -> Result<()> {
    let client = config::client(cluster.kubeconfig.as_deref(), cluster.context).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
                shutdown.cancel();
            }
        }
    });

    wait::wait_until_pods_running(client, cluster.pods, timeout, interval, Arc::new(Stdout), shutdown).await?;
    Ok(())
}

async fn run_status(ArgsStatus { cluster, timeout, output }: ArgsStatus) -> Result<()> {
    let client = config::client(cluster.kubeconfig.as_deref(), cluster.context).await?;
    let report = wait::current_status(client, &cluster.pods, timeout).await?;

    match output {
        OutputFormat::Text => {
            for line in report.lines() {
                Stdout.write_line(&line);
            }
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.all_running {
        eyre::bail!("not all control plane components are running");
    }
    Ok(())
}
