use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use superjob_engine::{
  BackendRunner, ChannelHandler, Engine, EngineConfig, LocalBackend, StoreHandler,
  WorkerCapability, WorkerDescriptor, WorkerRegistry, WorkflowEvent,
};
use superjob_store::{SqliteStore, Store};
use superjob_tree::{SuperjobDef, materialize};

/// Superjob - run trees of jobs to completion
#[derive(Parser)]
#[command(name = "superjob")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.superjob)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Database URL (default: sqlite://<data_dir>/superjob.db)
  #[arg(long, global = true, env = "SUPERJOB_DATABASE_URL")]
  database: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a superjob file on simulated local workers
  Run {
    /// Path to the superjob file (JSON)
    superjob_file: PathBuf,

    /// Superjob id (default: random)
    #[arg(long)]
    id: Option<String>,

    /// Delete the subjobs once the superjob completes
    #[arg(long)]
    delete_subjobs: bool,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,
  },

  /// Print a stored superjob and its subjobs
  Show {
    superjob_id: String,
  },
}

/// A superjob file: the blueprint plus the workers it may use.
#[derive(Deserialize)]
struct SuperjobFile {
  #[serde(flatten)]
  superjob: SuperjobDef,
  #[serde(default)]
  workers: Vec<WorkerSpec>,
}

#[derive(Deserialize)]
struct WorkerSpec {
  #[serde(flatten)]
  descriptor: WorkerDescriptor,
  /// How long the simulated worker takes.
  #[serde(default)]
  delay_ms: u64,
  /// Fail with this message instead of succeeding.
  #[serde(default)]
  fail: Option<String>,
}

struct SimulatedWorker {
  name: String,
  delay: Duration,
  fail: Option<String>,
}

#[async_trait]
impl superjob_engine::Worker for SimulatedWorker {
  async fn perform(&self, arguments: serde_json::Value) -> Result<(), String> {
    info!(worker = %self.name, arguments = %arguments, "performing");
    tokio::time::sleep(self.delay).await;
    match &self.fail {
      Some(cause) => Err(cause.clone()),
      None => Ok(()),
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(false)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".superjob"),
  };

  match cli.command {
    Some(Commands::Run {
      superjob_file,
      id,
      delete_subjobs,
      timeout,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async {
        let store = open_store(cli.database, &data_dir).await?;
        run_superjob(store, superjob_file, id, delete_subjobs, timeout).await
      })?;
    }
    Some(Commands::Show { superjob_id }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async {
        let store = open_store(cli.database, &data_dir).await?;
        print_superjob(store.as_ref(), &superjob_id).await
      })?;
    }
    None => {
      println!("superjob - use --help to see available commands");
    }
  }

  Ok(())
}

async fn open_store(database: Option<String>, data_dir: &Path) -> Result<Arc<dyn Store>> {
  let url = match database {
    Some(url) => url,
    None => {
      tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
      format!("sqlite://{}", data_dir.join("superjob.db").display())
    }
  };

  let store = SqliteStore::connect(&url)
    .await
    .with_context(|| format!("failed to open database: {}", url))?;
  Ok(Arc::new(store))
}

async fn run_superjob(
  store: Arc<dyn Store>,
  superjob_file: PathBuf,
  id: Option<String>,
  delete_subjobs: bool,
  timeout: u64,
) -> Result<()> {
  let content = tokio::fs::read_to_string(&superjob_file)
    .await
    .with_context(|| format!("failed to read superjob file: {}", superjob_file.display()))?;

  let file: SuperjobFile = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse superjob file: {}", superjob_file.display()))?;

  let superjob_id = id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
  let (superjob, subjobs) =
    materialize(&superjob_id, &file.superjob).context("invalid superjob definition")?;

  store.create_superjob(&superjob).await?;
  store.insert_subjobs(&subjobs).await?;
  eprintln!(
    "Created superjob {} ({}) with {} subjobs",
    superjob_id,
    superjob.name,
    subjobs.len()
  );

  // The descriptor drives both the engine's dispatch and the backend's uniqueness
  let (mut backend, reports) = LocalBackend::new();
  let mut registry = WorkerRegistry::new();
  for spec in file.workers {
    if spec.descriptor.capability == WorkerCapability::Executable {
      backend.register(
        &spec.descriptor,
        Arc::new(SimulatedWorker {
          name: spec.descriptor.name.clone(),
          delay: Duration::from_millis(spec.delay_ms),
          fail: spec.fail,
        }),
      );
    }
    registry.register(spec.descriptor);
  }

  let (tx, mut events) = mpsc::unbounded_channel();
  let handler = StoreHandler::new(store.clone(), delete_subjobs, ChannelHandler::new(tx));
  let config = EngineConfig {
    delete_subjobs_after_superjob_completes: delete_subjobs,
  };
  let engine = Arc::new(Engine::new(
    store.clone(),
    Arc::new(backend),
    Arc::new(registry),
    Arc::new(handler),
    config,
  ));

  let cancel = CancellationToken::new();
  let runner = tokio::spawn(BackendRunner::new(engine.clone(), reports).start(cancel.clone()));

  let outcome = async {
    engine
      .start(&superjob_id)
      .await
      .context("failed to start superjob")?;

    tokio::time::timeout(Duration::from_secs(timeout), events.recv())
      .await
      .with_context(|| format!("superjob did not finish within {}s", timeout))?
      .context("workflow event channel closed")
  }
  .await;

  cancel.cancel();
  runner.await.context("backend runner panicked")?;

  print_superjob(store.as_ref(), &superjob_id).await?;

  match outcome? {
    WorkflowEvent::Completed { .. } => {
      eprintln!("Superjob {} complete", superjob_id);
      Ok(())
    }
    WorkflowEvent::Failed { worker, cause, .. } => {
      bail!("superjob {} failed in {}: {}", superjob_id, worker, cause)
    }
  }
}

async fn print_superjob(store: &dyn Store, superjob_id: &str) -> Result<()> {
  let superjob = store
    .get_superjob(superjob_id)
    .await
    .with_context(|| format!("superjob '{}' not found", superjob_id))?;
  let subjobs = store.list_subjobs(superjob_id).await?;

  let output = serde_json::json!({
    "superjob": superjob,
    "subjobs": subjobs,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}
