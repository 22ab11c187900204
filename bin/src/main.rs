#![allow(clippy::cognitive_complexity)]
use anyhow::anyhow;

mod startup_health;

use config::ExporterConfig;
use control_channel::{ControlClient, DEFAULT_MAX_RESPONSE_SIZE, StatSource};
use exporter_core::{
    config::{
        cli::{self, Parser},
        trace,
    },
    prelude::{Arc, Context, Result, debug, error, info, tokio, warn},
    tokio::{runtime::Builder, signal},
};
use external_api::{ExternalApi, Health};
use snapshot::SnapshotCollector;
use startup_health::verify_background_task_running;

#[cfg(not(target_env = "musl"))]
use jemallocator::Jemalloc;
use tokio_util::sync::CancellationToken;

#[cfg(not(target_env = "musl"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.exporter_log)?;
    debug!(?config, ?trace_config);
    if let Err(err) = dotenv::dotenv() {
        debug!(?err, ".env file not loaded");
    }

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    // if we have a configured value here, set it
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    // build the runtime
    let rt = builder.build()?;

    // errors from start set the exit status
    rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => {
                error!(?err, "failed to start exporter");
                Err(anyhow!("exporter task failed: {err}"))
            }
            Ok(Err(err)) => {
                error!(?err, "exited with error");
                Err(err)
            }
            Ok(Ok(())) => {
                debug!("exiting...");
                Ok(())
            }
        }
    })
}

async fn start(config: cli::Config) -> Result<()> {
    debug!("parsing exporter config");
    let exporter_cfg = ExporterConfig::load(config.config_path.as_ref(), &config.targets)
        .context("invalid exporter configuration")?;
    let missing = exporter_cfg.check_sockets();
    if missing > 0 {
        warn!(missing, "some control sockets are not usable yet, their samples will be absent until they are");
    }

    // config file wins over the cli
    let timeout = exporter_cfg.timeout().unwrap_or_else(|| config.timeout());
    info!(
        sources = exporter_cfg.sources().len(),
        ?timeout,
        listen = %config.listen,
        "starting kea exporter"
    );

    let max_response_size = exporter_cfg
        .max_response_size()
        .unwrap_or(DEFAULT_MAX_RESPONSE_SIZE);
    let clients = exporter_cfg
        .sources()
        .iter()
        .map(|src| {
            info!(server = %src.identity(), kind = %src.kind(), address = %src.address(), "polling control channel");
            ControlClient::new(Arc::clone(src), timeout)
                .map(|client| {
                    Arc::new(client.with_max_response_size(max_response_size)) as Arc<dyn StatSource>
                })
                .map_err(|err| anyhow!("failed to create client for {src}: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let collector = Arc::new(SnapshotCollector::new(
        clients,
        exporter_cfg.rules().clone(),
        timeout,
    ));

    let api = ExternalApi::new(config.listen, collector);
    let token = CancellationToken::new();
    let api_sender = api.sender();
    let mut api_guard = api.start(token.clone());

    // Keep health BAD until the listener is confirmed running.
    if let Err(err) = verify_background_task_running("external API", api_guard.handle()).await {
        let _ = api_sender.send(Health::Bad).await;
        token.cancel();
        return Err(err);
    }

    debug!("changing health to good after startup checks passed");
    api_sender
        .send(Health::Good)
        .await
        .context("error occurred in changing health status to Good")?;

    tokio::select! {
        res = shutdown_signal(token.clone()) => {
            res?;
            info!("received ctrl-c, shutting down");
        }
        res = api_guard.handle() => {
            token.cancel();
            return Err(anyhow!("external API exited unexpectedly: {res:?}"));
        }
    }
    let _ = api_sender.send(Health::Bad).await;
    if let Err(err) = api_guard.handle().await {
        error!(?err, "error waiting for web server API");
    }
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ret = signal::ctrl_c().await.map_err(|err| anyhow!(err));
    token.cancel();
    ret
}
