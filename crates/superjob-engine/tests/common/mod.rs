#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use superjob_engine::{
  BackendError, ChannelHandler, Engine, EngineConfig, EngineError, ExecutionBackend, Invocation,
  StoreHandler, WorkerDescriptor, WorkerRegistry, WorkflowEvent,
};
use superjob_store::{MemoryStore, Store};
use superjob_tree::{NodeDef, Subjob, SubjobStatus, SuperjobDef, materialize};
use tokio::sync::mpsc;

pub const SUPERJOB_ID: &str = "sj";

/// One invocation seen by [`RecordingBackend`], with the subjob as the store
/// reported it at the moment the backend was called.
#[derive(Debug, Clone)]
pub struct Recorded {
  pub invocation: Invocation,
  pub observed: Option<Subjob>,
}

/// A backend that runs nothing. It records every invocation and can be told
/// to reject some workers.
pub struct RecordingBackend {
  store: Arc<dyn Store>,
  reject: HashSet<String>,
  calls: Mutex<Vec<Recorded>>,
}

impl RecordingBackend {
  pub fn new(store: Arc<dyn Store>, reject: &[&str]) -> Self {
    Self {
      store,
      reject: reject.iter().map(|s| s.to_string()).collect(),
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn calls(&self) -> Vec<Recorded> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
  async fn invoke(&self, invocation: Invocation) -> Result<(), BackendError> {
    let observed = self.store.find_by_handle(&invocation.handle).await.ok();
    let rejected = self.reject.contains(&invocation.worker);
    self.calls.lock().unwrap().push(Recorded {
      invocation,
      observed,
    });

    if rejected {
      return Err(BackendError::Other("queue unavailable".to_string()));
    }
    Ok(())
  }
}

/// Registry with the given executable workers and nested superjobs.
pub fn registry(executables: &[&str], superworkers: &[&str]) -> WorkerRegistry {
  executables
    .iter()
    .map(|name| WorkerDescriptor::executable(*name))
    .chain(
      superworkers
        .iter()
        .map(|name| WorkerDescriptor::superworker(*name)),
    )
    .collect()
}

pub struct Harness {
  pub store: Arc<dyn Store>,
  pub backend: Arc<RecordingBackend>,
  pub engine: Arc<Engine>,
  pub events: mpsc::UnboundedReceiver<WorkflowEvent>,
}

impl Harness {
  pub async fn new(nodes: Vec<NodeDef>, registry: WorkerRegistry) -> Self {
    Self::build(nodes, registry, EngineConfig::default(), &[]).await
  }

  pub async fn build(
    nodes: Vec<NodeDef>,
    registry: WorkerRegistry,
    config: EngineConfig,
    reject: &[&str],
  ) -> Self {
    let def = SuperjobDef {
      name: "test".to_string(),
      nodes,
    };
    let (superjob, subjobs) = materialize(SUPERJOB_ID, &def).unwrap();
    Self::from_records(superjob, subjobs, registry, config, reject).await
  }

  /// Like [`Harness::build`], on a caller-provided store.
  pub async fn build_in(
    store: Arc<dyn Store>,
    nodes: Vec<NodeDef>,
    registry: WorkerRegistry,
    config: EngineConfig,
    reject: &[&str],
  ) -> Self {
    let def = SuperjobDef {
      name: "test".to_string(),
      nodes,
    };
    let (superjob, subjobs) = materialize(SUPERJOB_ID, &def).unwrap();
    Self::from_records_in(store, superjob, subjobs, registry, config, reject).await
  }

  /// Build from hand-made records, for trees a blueprint would reject.
  pub async fn from_records(
    superjob: superjob_tree::Superjob,
    subjobs: Vec<Subjob>,
    registry: WorkerRegistry,
    config: EngineConfig,
    reject: &[&str],
  ) -> Self {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    Self::from_records_in(store, superjob, subjobs, registry, config, reject).await
  }

  pub async fn from_records_in(
    store: Arc<dyn Store>,
    superjob: superjob_tree::Superjob,
    subjobs: Vec<Subjob>,
    registry: WorkerRegistry,
    config: EngineConfig,
    reject: &[&str],
  ) -> Self {
    store.create_superjob(&superjob).await.unwrap();
    store.insert_subjobs(&subjobs).await.unwrap();

    let (tx, events) = mpsc::unbounded_channel();
    let handler = StoreHandler::new(
      store.clone(),
      config.delete_subjobs_after_superjob_completes,
      ChannelHandler::new(tx),
    );
    let backend = Arc::new(RecordingBackend::new(store.clone(), reject));
    let engine = Arc::new(Engine::new(
      store.clone(),
      backend.clone(),
      Arc::new(registry),
      Arc::new(handler),
      config,
    ));

    Self {
      store,
      backend,
      engine,
      events,
    }
  }

  pub async fn subjob(&self, subjob_id: &str) -> Subjob {
    self.store.get_subjob(subjob_id).await.unwrap()
  }

  pub async fn status(&self, subjob_id: &str) -> SubjobStatus {
    self.subjob(subjob_id).await.status
  }

  /// Report backend success for a queued subjob.
  pub async fn finish(&self, subjob_id: &str) -> Result<(), EngineError> {
    let handle = self
      .subjob(subjob_id)
      .await
      .job_handle
      .expect("subjob was never queued");
    self.engine.complete_by_handle(&handle).await
  }

  /// Report backend failure for a queued subjob.
  pub async fn fail(&self, subjob_id: &str, cause: &str) -> Result<(), EngineError> {
    let subjob = self.subjob(subjob_id).await;
    let handle = subjob.job_handle.expect("subjob was never queued");
    let worker = subjob.kind.as_str().to_string();
    let item = serde_json::json!({ "class": worker, "args": subjob.arguments, "jid": handle });
    self.engine.fail_by_handle(&handle, &worker, item, cause).await
  }

  /// Subjob ids handed to the backend, in invocation order.
  pub fn invoked(&self) -> Vec<String> {
    self
      .backend
      .calls()
      .into_iter()
      .filter_map(|call| call.observed.map(|subjob| subjob.subjob_id))
      .collect()
  }

  /// Queued subjobs whose handle never reached the backend.
  pub async fn orphaned(&self) -> Vec<String> {
    let invoked: HashSet<String> = self
      .backend
      .calls()
      .into_iter()
      .map(|call| call.invocation.handle)
      .collect();
    self
      .store
      .list_subjobs(SUPERJOB_ID)
      .await
      .unwrap()
      .into_iter()
      .filter(|subjob| subjob.status == SubjobStatus::Queued)
      .filter(|subjob| {
        subjob
          .job_handle
          .as_ref()
          .is_none_or(|handle| !invoked.contains(handle))
      })
      .map(|subjob| subjob.subjob_id)
      .collect()
  }

  pub fn drain_events(&mut self) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      events.push(event);
    }
    events
  }
}
