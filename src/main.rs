use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use edgevisor::{
    ConfigStore, ControlSettings, CrashPolicy, DetectionForwarder, FileStore, LogSink, LogWriter,
    Publish, ReportSink, Reporter, Subscribe, Supervisor, SupervisorConfig, TopicSink,
    WorkerRegistry,
};

/// Edge detection agent: runs one detection module and swaps it on demand.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration document
    #[arg(long, env = "EDGEVISOR_CONFIG", default_value = edgevisor::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Seconds a worker gets to stop before it is killed
    #[arg(long, default_value_t = 10)]
    grace_secs: u64,

    /// What to do when the worker dies on its own (report|restart|exit)
    #[arg(long, default_value_t = CrashPolicy::Report)]
    crash_policy: CrashPolicy,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent (default)
    Run,
    /// Run a single detection module in this process (spawned by the agent)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        module: String,
        #[arg(long)]
        submodule: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let outcome = match &args.command {
        Some(Command::Worker { module, submodule }) => {
            edgevisor::modules::run_worker(module, submodule).await
        }
        Some(Command::Run) | None => run_agent(&args).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!(target: "edgevisor", "{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_agent(args: &Args) -> Result<()> {
    let store = Arc::new(FileStore::new(&args.config));
    let doc = store.load()?;
    let control = ControlSettings::from_document(&doc)?;

    let (publisher, control_loop) = edgevisor::connect(&control)?;
    let publisher: Arc<dyn Publish> = Arc::new(publisher);

    let sink: Arc<dyn ReportSink> = match &control.report_topic {
        Some(topic) => Arc::new(TopicSink::new(Arc::clone(&publisher), topic)),
        None => Arc::new(LogSink),
    };
    let mut subscribers: Vec<Arc<dyn Subscribe>> =
        vec![Arc::new(LogWriter::new()), Arc::new(Reporter::new(sink))];
    if let Some(topic) = &control.detection_topic {
        subscribers.push(Arc::new(DetectionForwarder::new(Arc::clone(&publisher), topic)));
    }

    let cfg = SupervisorConfig {
        grace: Duration::from_secs(args.grace_secs),
        crash_policy: args.crash_policy,
        ..SupervisorConfig::default()
    };
    let sup = Supervisor::builder(cfg)
        .with_store(store)
        .with_registry(WorkerRegistry::with_defaults()?)
        .with_subscribers(subscribers)
        .build();

    let token = CancellationToken::new();
    let channel = control_loop
        .on_message(Arc::new(sup.handle()))
        .spawn(sup.bus().clone(), token.clone());

    log::info!(
        target: "edgevisor",
        "agent starting with {} (crash policy {})",
        args.config.display(),
        args.crash_policy
    );
    let result = sup.run().await;

    token.cancel();
    if let Err(e) = channel.await {
        log::warn!(target: "edgevisor", "control loop ended abnormally: {e}");
    }

    result.context("supervisor stopped on a fatal error")
}
