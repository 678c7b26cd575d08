//! Superjob Engine
//!
//! This crate provides the completion-cascade engine for superjobs: it
//! decides when each subjob of a tree may start, what completion means for
//! it, and what a completion or failure sets in motion next.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BackendRunner                          │
//! │  - owns the backend report receiver                         │
//! │  - start(cancel) turns reports into engine callbacks        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │  - enqueue(subjob)   dispatch by kind (parallel, batch,     │
//! │                      nested superjob, executable worker)    │
//! │  - complete(subjob)  start the subtree or propagate upward  │
//! │  - fail(subjob)      record failure, notify the handler     │
//! └─────────────────────────────────────────────────────────────┘
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//! ┌───────────────┐   ┌───────────────────┐   ┌─────────────────┐
//! │     Store     │   │ ExecutionBackend  │   │ WorkflowHandler │
//! │ subjob trees  │   │ runs leaf work    │   │ superjob-level  │
//! │ CAS updates   │   │ (LocalBackend)    │   │ outcomes        │
//! └───────────────┘   └───────────────────┘   └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use superjob_engine::{BackendRunner, Engine, EngineConfig, LocalBackend, NoopHandler};
//! use tokio_util::sync::CancellationToken;
//!
//! let fetch = WorkerDescriptor::executable("Fetch");
//! let (mut backend, reports) = LocalBackend::new();
//! backend.register(&fetch, Arc::new(FetchWorker));
//!
//! let registry: WorkerRegistry = [fetch].into_iter().collect();
//! let engine = Arc::new(Engine::new(
//!     store,
//!     Arc::new(backend),
//!     Arc::new(registry),
//!     Arc::new(NoopHandler),
//!     EngineConfig::default(),
//! ));
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(BackendRunner::new(engine.clone(), reports).start(cancel.clone()));
//! engine.start("sj").await?;
//! ```

mod backend;
mod cascade;
mod config;
mod dispatcher;
mod engine;
mod error;
mod handler;
mod local;
mod registry;
mod reporter;
mod runner;

pub use backend::{BackendError, ExecutionBackend, Invocation};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use handler::{ChannelHandler, NoopHandler, StoreHandler, WorkflowEvent, WorkflowHandler};
pub use local::{BackendReport, LocalBackend, Worker};
pub use registry::{Resolved, UniquePolicy, WorkerCapability, WorkerDescriptor, WorkerRegistry};
pub use runner::BackendRunner;
