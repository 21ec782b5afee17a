//! ecs-monitor: ECS tag compliance and spot price monitor
//!
//! Reports instances missing their environment tag, tags Kubernetes workers
//! and exports spot prices as Prometheus gauges, once or on a cron schedule.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecs_monitor::cloud::{
    CloudError, CredentialStore, EcsClient, IdentityProvider, MetadataProvider,
    classify_anyhow_error, run_refresh_loop,
};
use ecs_monitor::config::{CloudConfig, SpotJobConfig, TagJobConfig};
use ecs_monitor::logging::{LogConfig, init_logging};
use ecs_monitor::metrics::{self, MetricsSink, PrometheusSink};
use ecs_monitor::reconcile::{RunSummary, SpotReconciler, TagReconciler, is_already_running};
use ecs_monitor::schedule::{Schedule, run_scheduled};
use ecs_monitor_common::defaults::{
    DEFAULT_ECS_ENDPOINT, DEFAULT_METADATA_ENDPOINT, DEFAULT_METRICS_ADDR, DEFAULT_PAGE_SIZE,
};
use ecs_monitor_common::metrics::{labels, names};
use prometheus::Registry;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ecs-monitor")]
#[command(about = "ECS tag compliance and spot price monitoring for Alibaba Cloud")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stdout
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Address for the Prometheus endpoint in scheduled mode
    #[arg(long, global = true, default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: SocketAddr,

    /// ECS API endpoint
    #[arg(long, global = true, default_value = DEFAULT_ECS_ENDPOINT)]
    endpoint: String,

    /// Instance metadata service root
    #[arg(long, global = true, hide = true, default_value = DEFAULT_METADATA_ENDPOINT)]
    metadata_endpoint: String,

    /// Region for static credentials
    #[arg(long, global = true, env = "ALICLOUD_REGION")]
    region: Option<String>,

    /// Access key; role credentials from instance metadata are used when unset
    #[arg(long, global = true, env = "ALICLOUD_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    /// Secret key matching --access-key
    #[arg(long, global = true, env = "ALICLOUD_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn cloud_config(&self) -> CloudConfig {
        CloudConfig {
            endpoint: self.endpoint.clone(),
            metadata_endpoint: self.metadata_endpoint.clone(),
            region: self.region.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        }
    }
}

/// Arguments for the ecs command
#[derive(clap::Args, Debug)]
struct EcsArgs {
    /// Exact instance name, filtered server-side
    #[arg(short = 'n', long)]
    instance_name: Option<String>,

    /// Page size for listing calls
    #[arg(short = 's', long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Exact tag filter, e.g. cluster=prod (repeatable, comma-separated)
    #[arg(short = 't', long, value_delimiter = ',')]
    tag: Vec<String>,

    /// Instance name regex; any match includes (repeatable, comma-separated)
    #[arg(long = "re", value_delimiter = ',')]
    name_patterns: Vec<String>,

    /// Exclude instances with a tag key matching this regex
    #[arg(long, value_delimiter = ',')]
    no_tag_key: Vec<String>,

    /// Exclude instances with a tag value matching this regex
    #[arg(long, value_delimiter = ',')]
    no_tag_value: Vec<String>,

    /// Six-field cron expression (seconds first); runs once when omitted
    #[arg(short = 'c', long)]
    cron: Option<String>,
}

/// Arguments for the update-k8s-tags command
#[derive(clap::Args, Debug)]
struct UpdateArgs {
    /// Only tag this instance
    #[arg(short = 'i', long)]
    instance_id: Option<String>,

    /// Page size for listing calls
    #[arg(short = 's', long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Six-field cron expression (seconds first); runs once when omitted
    #[arg(short = 'c', long)]
    cron: Option<String>,
}

/// Arguments for the spot-price command
#[derive(clap::Args, Debug)]
struct SpotArgs {
    /// Page size for listing calls
    #[arg(short = 's', long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Six-field cron expression (seconds first); runs once when omitted
    #[arg(short = 'c', long)]
    cron: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report instances missing the environment tag
    Ecs(EcsArgs),

    /// Tag Kubernetes workers with the environment of their VPC
    UpdateK8sTags(UpdateArgs),

    /// Export spot and list prices for Kubernetes worker instance types
    SpotPrice(SpotArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Ecs(_) => "ecs",
            Command::UpdateK8sTags(_) => "update-k8s-tags",
            Command::SpotPrice(_) => "spot-price",
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig {
        level: args.log_level.clone(),
        file: args.log_file.clone(),
    })?;

    let cancel = CancellationToken::new();
    let registry = Arc::new(Registry::new());
    let sink = PrometheusSink::new(registry.clone()).context("Failed to register metrics")?;
    let command_name = args.command.name();

    // Validate everything before touching the cloud
    let job = match &args.command {
        Command::Ecs(a) => Job::Tags(TagJobConfig::query(
            &a.name_patterns,
            &a.tag,
            &a.no_tag_key,
            &a.no_tag_value,
            a.instance_name.clone(),
            a.page_size,
            a.cron.as_deref(),
        )?),
        Command::UpdateK8sTags(a) => Job::Tags(TagJobConfig::update_k8s_workers(
            a.instance_id.clone(),
            a.page_size,
            a.cron.as_deref(),
        )?),
        Command::SpotPrice(a) => Job::Spot(SpotJobConfig::new(a.page_size, a.cron.as_deref())?),
    };

    let store = resolve_credentials(&args.cloud_config(), &cancel).await?;
    let client = EcsClient::with_endpoint(store, args.endpoint.clone())?;
    info!(command = command_name, endpoint = %client.endpoint(), "Starting");

    let driver = Driver {
        registry,
        metrics_addr: args.metrics_addr,
        cancel: cancel.clone(),
    };

    let result = match job {
        Job::Tags(config) => {
            sink.set_gauge(names::NO_TAG_WATCHDOG, &[(labels::NAME, command_name)], 1.0);
            let schedule = config.schedule.clone();
            let reconciler = Arc::new(TagReconciler::new(client, sink, config));
            driver
                .drive(schedule, move || {
                    let reconciler = reconciler.clone();
                    async move { reconciler.run().await }
                })
                .await
        }
        Job::Spot(config) => {
            sink.set_gauge(names::SPOT_PRICE_WATCHDOG, &[(labels::NAME, command_name)], 1.0);
            let schedule = config.schedule.clone();
            let reconciler = Arc::new(SpotReconciler::new(client, sink, config)?);
            driver
                .drive(schedule, move || {
                    let reconciler = reconciler.clone();
                    async move { reconciler.run().await }
                })
                .await
        }
    };

    cancel.cancel();
    result
}

enum Job {
    Tags(TagJobConfig),
    Spot(SpotJobConfig),
}

/// Use static keys when configured, otherwise role credentials that a
/// background task keeps fresh.
async fn resolve_credentials(config: &CloudConfig, cancel: &CancellationToken) -> Result<CredentialStore> {
    if let Some(credential) = config.static_credential()? {
        info!(region = %credential.region_id, "Using static credentials");
        return Ok(CredentialStore::new(credential));
    }

    let provider = MetadataProvider::with_endpoint(config.metadata_endpoint.clone())?;
    let identity = provider
        .identity()
        .await
        .context("Failed to read instance identity from metadata service")?;
    info!(
        role = %identity.role_name,
        region = %identity.region_id,
        vpc = %identity.vpc_id,
        "Using instance role credentials"
    );

    let credential = provider
        .fetch()
        .await
        .context("Failed to obtain role credentials")?;
    let store = CredentialStore::new(credential);
    tokio::spawn(run_refresh_loop(store.clone(), provider, cancel.clone()));
    Ok(store)
}

/// Runs a job once, or on a schedule with the metrics endpoint up
struct Driver {
    registry: Arc<Registry>,
    metrics_addr: SocketAddr,
    cancel: CancellationToken,
}

impl Driver {
    async fn drive<F, Fut>(self, schedule: Option<Schedule>, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RunSummary>> + Send + 'static,
    {
        let Some(schedule) = schedule else {
            let summary = job().await?;
            info!(%summary, "Run finished");
            return Ok(());
        };

        let listener = metrics::bind(self.metrics_addr).await?;
        let mut server = tokio::spawn(metrics::serve(listener, self.registry, self.cancel.clone()));
        let scheduler = tokio::spawn(run_scheduled(schedule, self.cancel.clone(), move || {
            let run = job();
            async move { log_outcome(run.await) }
        }));

        let result = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                signal.context("Failed to listen for Ctrl-C")
            }
            served = &mut server => match served.context("Metrics server panicked")? {
                Ok(()) => Err(anyhow::anyhow!("Metrics server stopped unexpectedly")),
                Err(e) => Err(e),
            },
        };

        self.cancel.cancel();
        let _ = scheduler.await;
        if !server.is_finished() {
            let _ = server.await;
        }
        result
    }
}

fn log_outcome(result: Result<RunSummary>) {
    match result {
        Ok(summary) => info!(%summary, "Scheduled run finished"),
        Err(e) if is_already_running(&e) => info!(error = %e, "Skipping scheduled run"),
        Err(e) if classify_anyhow_error(&e).is_some_and(CloudError::is_credential_rejected) => {
            error!(error = %format!("{e:#}"), "Scheduled run failed, credential rejected by the API")
        }
        Err(e) => error!(error = %format!("{e:#}"), "Scheduled run failed"),
    }
}
