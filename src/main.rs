use anyhow::{Context, bail};
use cluster_coordination::config::CoordinationConfig;
use cluster_coordination::executor::{OperationExecutor, OperationHandlerRegistry};
use cluster_coordination::membership::NodeMetadata;
use cluster_coordination::monitor::{MetricsRecord, MetricsWatcher, OutputType};
use cluster_coordination::protocol::{ClusterProtocol, NodeOperation};
use cluster_coordination::store::handlers::StoreServer;
use cluster_coordination::store::remote::RemoteStore;
use cluster_coordination::store::{CoordinationStore, InMemoryStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const METRICS_INTERVAL: Duration = Duration::from_secs(5);

struct Args {
    command: String,
    config: CoordinationConfig,
    node_name: Option<String>,
    workers: usize,
    output: OutputType,
}

fn usage(program: &str) {
    eprintln!("Usage: {} <serve|monitor|node> [options]", program);
    eprintln!("  serve   --bind <addr:port>");
    eprintln!("  monitor --store <url> [--stdout]");
    eprintln!("  node    --store <url> --name <node> [--workers <n>]");
    eprintln!("Common: --config <file.toml> (COORD_* variables override it)");
    eprintln!("Example: {} serve --bind 127.0.0.1:2181", program);
    eprintln!(
        "Example: {} node --store http://127.0.0.1:2181 --name node1",
        program
    );
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} needs a value", flag))
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let command = args[1].clone();

    let mut config_file: Option<String> = None;
    let mut bind_addr: Option<String> = None;
    let mut store_url: Option<String> = None;
    let mut node_name: Option<String> = None;
    let mut workers = 2;
    let mut output = OutputType::Log;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                config_file = Some(value(args, i, "--config")?.to_string());
                i += 2;
            }
            "--bind" => {
                bind_addr = Some(value(args, i, "--bind")?.to_string());
                i += 2;
            }
            "--store" => {
                store_url = Some(value(args, i, "--store")?.to_string());
                i += 2;
            }
            "--name" => {
                node_name = Some(value(args, i, "--name")?.to_string());
                i += 2;
            }
            "--workers" => {
                workers = value(args, i, "--workers")?
                    .parse()
                    .context("--workers must be a number")?;
                i += 2;
            }
            "--stdout" => {
                output = OutputType::Stdout;
                i += 1;
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    let base = match config_file {
        Some(path) => CoordinationConfig::load(path)?,
        None => CoordinationConfig::default(),
    };
    let mut config = base.with_overrides(|key| std::env::var(key).ok())?;
    if let Some(bind_addr) = bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(store_url) = store_url {
        config.store_url = store_url;
        config.embedded = false;
    }

    Ok(Args {
        command,
        config,
        node_name,
        workers,
        output,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage(&args[0]);
        std::process::exit(1);
    }

    let args = parse_args(&args)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    match args.command.as_str() {
        "serve" => run_server(&args.config, shutdown).await,
        "monitor" => run_monitor(&args, shutdown).await,
        "node" => run_node(&args, shutdown).await,
        other => {
            usage("coordinator");
            bail!("Unknown command {}", other)
        }
    }
}

/// Serves an in-process store over HTTP until shutdown.
async fn run_server(config: &CoordinationConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let server = StoreServer::new(store, config.session_timeout());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!("Press Ctrl+C to shutdown");
    server.serve(listener, shutdown).await
}

/// Session against the configured store. In embedded mode the store is
/// created here and also served on `bind_addr` for other processes.
async fn connect(
    config: &CoordinationConfig,
    shutdown: &CancellationToken,
) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    if config.embedded {
        let store = InMemoryStore::new();
        let server = StoreServer::new(store.clone(), config.session_timeout());
        let listener = tokio::net::TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind embedded store on {}", config.bind_addr))?;
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve(listener, token).await {
                tracing::error!("Embedded store server failed: {:#}", e);
            }
        });
        tracing::info!("Running embedded store on {}", config.bind_addr);
        return Ok(store.connect().await);
    }

    let store = RemoteStore::connect(config)
        .await
        .with_context(|| format!("Failed to connect to store at {}", config.store_url))?;
    tracing::info!(
        "Connected to {} as session {}",
        config.store_url,
        store.session_id()
    );
    Ok(store)
}

/// The monitor only observes a cluster, so it always connects to
/// `store_url` instead of starting an empty embedded store.
fn monitor_config(config: &CoordinationConfig) -> CoordinationConfig {
    let mut config = config.clone();
    if config.embedded {
        tracing::warn!(
            "Monitor ignores embedded mode, connecting to {}",
            config.store_url
        );
        config.embedded = false;
    }
    config
}

async fn run_monitor(args: &Args, shutdown: CancellationToken) -> anyhow::Result<()> {
    let config = monitor_config(&args.config);
    let store = connect(&config, &shutdown).await?;
    let watcher = MetricsWatcher::with_output(store.clone(), &config.namespace(), args.output);
    watcher.start().await?;

    let stopper = watcher.clone();
    let token = shutdown.clone();
    tokio::spawn(async move {
        token.cancelled().await;
        stopper.stop();
    });

    watcher.join().await;
    tracing::info!("Monitor stopped");
    shutdown.cancel();
    store.close().await?;
    Ok(())
}

async fn run_node(args: &Args, shutdown: CancellationToken) -> anyhow::Result<()> {
    let name = args
        .node_name
        .clone()
        .unwrap_or_else(NodeMetadata::generated_name);
    let store = connect(&args.config, &shutdown).await?;
    let protocol = ClusterProtocol::new(store.clone(), args.config.namespace()).await?;
    let registry = protocol.registry().clone();

    registry
        .announce(&NodeMetadata::new(&name, &args.config.bind_addr))
        .await?;
    let listener = registry.start_session_listener(shutdown.clone());

    let executed = Arc::new(AtomicU64::new(0));
    let handlers = OperationHandlerRegistry::<NodeOperation>::new();
    {
        let registry = registry.clone();
        let node = name.clone();
        let executed = executed.clone();
        let deploy = move |operation: NodeOperation| {
            let registry = registry.clone();
            let node = node.clone();
            let executed = executed.clone();
            async move {
                if let NodeOperation::DeployShards { index, shards }
                | NodeOperation::RedeployShards { index, shards } = operation
                {
                    for shard in &shards {
                        tracing::info!("Deploying {} of {} from {}", shard.name, index, shard.location);
                        registry.announce_shard(&shard.name, &node).await?;
                    }
                }
                executed.fetch_add(1, Ordering::Relaxed);
                Ok::<(), anyhow::Error>(())
            }
        };
        handlers.register("deploy_shards", deploy.clone());
        handlers.register("redeploy_shards", deploy);
    }
    {
        let registry = registry.clone();
        let node = name.clone();
        let executed = executed.clone();
        handlers.register("undeploy_shards", move |operation: NodeOperation| {
            let registry = registry.clone();
            let node = node.clone();
            let executed = executed.clone();
            async move {
                if let NodeOperation::UndeployShards { index, shards } = operation {
                    for shard in &shards {
                        tracing::info!("Undeploying {} of {}", shard, index);
                        registry.withdraw_shard(shard, &node).await?;
                    }
                }
                executed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });
    }

    let executor = OperationExecutor::new(
        &name,
        protocol.node_queue(&name).await?,
        handlers,
        args.workers,
    );
    let workers = executor.start(shutdown.clone());

    let mut interval = tokio::time::interval(METRICS_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let record = MetricsRecord::new(&name)
                    .with_value("operations_executed", executed.load(Ordering::Relaxed) as f64);
                if let Err(e) = protocol.publish_metrics(&record).await {
                    tracing::warn!("Failed to publish metrics: {}", e);
                }
            }
        }
    }

    for worker in workers {
        let _ = worker.await;
    }
    let _ = listener.await;
    if let Err(e) = registry.withdraw(&name).await {
        tracing::warn!("Failed to withdraw {}: {}", name, e);
    }
    store.close().await?;
    tracing::info!("Node {} stopped", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_never_runs_embedded() {
        let config = CoordinationConfig::default();
        assert!(config.embedded);

        let monitored = monitor_config(&config);

        assert!(!monitored.embedded);
        assert_eq!(monitored.store_url, config.store_url);
    }

    #[test]
    fn test_store_flag_selects_remote_mode() {
        let args: Vec<String> = ["coordinator", "monitor", "--store", "http://10.0.0.5:2181"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let parsed = parse_args(&args).unwrap();

        assert!(!parsed.config.embedded);
        assert_eq!(parsed.config.store_url, "http://10.0.0.5:2181");
    }
}
