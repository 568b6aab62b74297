//! # 🎭 cassandra-orchestration — Kernel de Coordenação
//!
//! Executa componentes concorrentes que trocam dados por capacidades
//! nomeadas: cada capacidade tem um único dono, é publicada uma única vez e
//! quem a busca espera até ela existir (ou até o dono falhar).
//!
//! ## Arquitetura
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Orchestrator                             │
//! │  RunConfig (TOML / INI) ──► ComponentFactory ──► slots      │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │            Scheduler                                  │  │
//! │  │  prepare() em ordem → barreira → run() em threads     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │            Capability Table                           │  │
//! │  │  register | publish (uma vez) | fetch (bloqueante)    │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │            Distributed (opcional)                     │  │
//! │  │  Announce | FetchRequest | FetchReply | Done          │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exemplo
//!
//! ```ignore
//! use cassandra_orchestration::{ComponentFactory, Orchestrator, RunConfig};
//!
//! let config = RunConfig::load("run.toml".as_ref())?;
//! let orch = Orchestrator::new(config, ComponentFactory::with_builtins())?;
//!
//! let report = orch.run_local()?;
//! std::process::exit(report.exit_code);
//! ```

pub mod capability;
pub mod components;
pub mod config;
pub mod distributed;
pub mod error;
pub mod events;
pub mod factory;
pub mod handle;
pub mod orchestrator;
pub mod scheduler;
pub mod wrapper;

pub use capability::{
    CapabilityEntry, CapabilityInfo, CapabilityTable, EntryOrigin, EntryStatus, Rank,
    RemoteResolver, Resolution,
};
pub use components::{ExecComponent, GlobalParamsComponent};
pub use config::{ClusterConfig, ComponentSpec, RunConfig, GLOBAL_KIND};
pub use distributed::{
    ChannelTransport, CoordinationMessage, Envelope, FetchOutcome, RankNode, TcpTransport,
    Transport,
};
pub use error::{OrchestrationError, OrchestrationResult};
pub use events::{EventBus, EventFilter, LifecycleEvent, Subscription};
pub use factory::{ComponentFactory, Constructor};
pub use handle::{KernelHandle, StatusCell};
pub use orchestrator::Orchestrator;
pub use scheduler::{ComponentReport, ComponentSlot, RunReport, Scheduler, SchedulerConfig};
pub use wrapper::ComponentWrapper;

// Re-exporta as abstrações do core
pub use cassandra_core::prelude::*;
