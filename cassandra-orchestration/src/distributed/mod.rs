//! # Execução Distribuída
//!
//! Componentes em ranks diferentes mantêm o mesmo contrato bloqueante:
//! um fetch de capacidade remota espera exatamente como um fetch local.
//!
//! ```text
//!  rank 0                                   rank 1
//!  ──────                                   ──────
//!  prepare() locais                         prepare() locais
//!  Announce{registros} ───────────────────► register_remote(...)
//!  register_remote(...) ◄─────────────────── Announce{registros}
//!  ══════════════ barreira de registro (todos os Announce) ══════════════
//!  run() ... fetch("x") ── FetchRequest ──► serving thread: espera "x"
//!                       ◄── FetchReply ───── publish("x") / falha do dono
//!  Done{relatórios} ◄─────────────────────► Done{relatórios}
//!  ══════════════ relatório global em todos os ranks ═══════════════════
//! ```
//!
//! Um peer perdido sela como falhas todas as capacidades que ele possui;
//! ninguém fica esperando para sempre.

pub mod message;
pub mod transport;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, Scope};
use crossbeam_channel::{bounded, select, Receiver};
use cassandra_core::error::EXIT_PROTOCOL_ERROR;
use cassandra_core::{CapabilityError, ComponentState};

use crate::capability::{CapabilityTable, Rank, RemoteResolver};
use crate::config::RunConfig;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::factory::ComponentFactory;
use crate::scheduler::{ComponentReport, ComponentSlot, RunReport, Scheduler};
use crate::wrapper::ComponentWrapper;

pub use message::{CoordinationMessage, Envelope, FetchOutcome, Registration};
pub use transport::{peers_of, ChannelTransport, Incoming, TcpTransport, Transport};

// ═══════════════════════════════════════════════════════════════════════════════
// PEER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// O que este rank já sabe sobre os peers
#[derive(Debug, Default)]
struct PeerState {
    announces: BTreeMap<Rank, Vec<Registration>>,
    done: BTreeMap<Rank, Vec<ComponentReport>>,
    lost: HashSet<Rank>,
}

/// Estado compartilhado entre o dispatcher e a thread principal
#[derive(Debug, Default)]
struct Peers {
    state: Mutex<PeerState>,
    changed: Condvar,
}

impl Peers {
    fn update(&self, f: impl FnOnce(&mut PeerState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
        self.changed.notify_all();
    }

    fn lost(&self) -> Vec<Rank> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.lost.iter().copied().collect()
    }

    /// Espera até `ready` valer para todo peer em `pending`
    fn wait_all(&self, mut pending: HashSet<Rank>, ready: impl Fn(&PeerState, Rank) -> bool) -> PeerStateView {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            pending.retain(|rank| !ready(&state, *rank) && !state.lost.contains(rank));
            if pending.is_empty() {
                return PeerStateView {
                    announces: state.announces.clone(),
                    done: state.done.clone(),
                    lost: state.lost.clone(),
                };
            }
            state = self.changed.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Cópia do estado dos peers num instante
#[derive(Debug, Clone)]
struct PeerStateView {
    announces: BTreeMap<Rank, Vec<Registration>>,
    done: BTreeMap<Rank, Vec<ComponentReport>>,
    lost: HashSet<Rank>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Envia `FetchRequest` para o rank dono
struct TransportResolver {
    transport: Arc<dyn Transport>,
}

impl RemoteResolver for TransportResolver {
    fn request(&self, capability: &str, rank: Rank) -> Result<(), String> {
        tracing::debug!(capability, rank, "requesting remote capability");
        self.transport
            .send(rank, CoordinationMessage::FetchRequest { capability: capability.to_string() })
            .map_err(|e| e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RANK NODE
// ═══════════════════════════════════════════════════════════════════════════════

/// Um processo participante de uma execução distribuída
pub struct RankNode {
    transport: Arc<dyn Transport>,
    scheduler: Scheduler,
}

impl RankNode {
    pub fn new(transport: Arc<dyn Transport>, scheduler: Scheduler) -> Self {
        Self { transport, scheduler }
    }

    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    /// Roda a parte deste rank e devolve o relatório global
    pub fn run(&self, config: &RunConfig, factory: &ComponentFactory) -> OrchestrationResult<RunReport> {
        let rank = self.rank();
        let size = self.transport.size();
        if size != config.rank_count() {
            return Err(OrchestrationError::InvalidConfiguration(format!(
                "transport has {size} rank(s) but the configuration describes {}",
                config.rank_count()
            )));
        }

        // Todos os ranks validam todos os tipos: falham juntos
        for spec in &config.components {
            if !factory.contains(&spec.kind) {
                return Err(OrchestrationError::ComponentNotFound(spec.kind.clone()));
            }
        }

        let table = self.scheduler.new_table();
        table.set_remote_resolver(Arc::new(TransportResolver {
            transport: Arc::clone(&self.transport),
        }));

        let mut slots = Vec::new();
        for (index, spec) in config.components_for_rank(rank) {
            slots.push(
                ComponentSlot::new(&spec.name, factory.create(&spec.kind)?)
                    .with_params(spec.params.clone())
                    .with_index(index)
                    .with_rank(rank),
            );
        }
        let mut wrappers = self.scheduler.prepare(&table, slots);

        let peers = Peers::default();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let incoming = self.transport.incoming();

        let (table_ref, peers_ref, incoming_ref, stop_ref) = (&table, &peers, &incoming, &stop_rx);
        let outcome = thread::scope(|scope| {
            let dispatcher = thread::Builder::new()
                .name(format!("cassandra-dispatch-{rank}"))
                .spawn_scoped(scope, move || {
                    self.dispatch(scope, table_ref, peers_ref, incoming_ref, stop_ref)
                })?;

            let result = self.coordinate(config, table_ref, peers_ref, &mut wrappers);
            if let Err(err) = &result {
                // Sela o que ficou pendente: serving threads não podem ficar presas
                for wrapper in wrappers.iter_mut() {
                    wrapper.abort(format!("distributed run aborted: {err}"));
                }
            }

            let _ = stop_tx.send(());
            if dispatcher.join().is_err() {
                tracing::error!(rank, "dispatcher panicked");
            }
            result
        });

        self.transport.shutdown();
        outcome
    }

    /// Barreira de registro, execução, barreira de término
    fn coordinate(
        &self,
        config: &RunConfig,
        table: &Arc<CapabilityTable>,
        peers: &Peers,
        wrappers: &mut [ComponentWrapper],
    ) -> OrchestrationResult<RunReport> {
        let rank = self.rank();
        let size = self.transport.size();

        // Fase 1: anunciar registros locais e esperar os dos peers
        let capabilities: Vec<Registration> = table
            .local_registrations()
            .into_iter()
            .map(|(capability, owner)| Registration { capability, owner })
            .collect();
        self.broadcast(&CoordinationMessage::Announce { capabilities })?;

        let view = peers.wait_all(transport::pending_peers(rank, size), |s, r| {
            s.announces.contains_key(&r)
        });
        if let Some(lost) = view.lost.iter().find(|r| !view.announces.contains_key(r)) {
            return Err(OrchestrationError::Transport(format!(
                "rank {lost} lost before the registration barrier"
            )));
        }

        for (peer, registrations) in &view.announces {
            for reg in registrations {
                table.register_remote(&reg.capability, &reg.owner, *peer)?;
            }
        }
        table.close_registration();

        // Peers perdidos antes das entradas existirem: sela agora
        for lost in peers.lost() {
            table.fail_rank(lost, &format!("rank {lost} disconnected"));
        }
        tracing::info!(rank, capabilities = table.len(), "registration barrier passed");

        // Fase 2: execução local
        self.scheduler.execute(wrappers);
        let local: Vec<ComponentReport> = wrappers.iter().map(|w| w.report()).collect();

        // Fase 3: trocar relatórios
        if let Err(err) = self.broadcast(&CoordinationMessage::Done { reports: local.clone() }) {
            tracing::warn!(rank, %err, "failed to deliver Done to every peer");
        }
        let view = peers.wait_all(transport::pending_peers(rank, size), |s, r| s.done.contains_key(&r));

        let mut reports = local;
        for peer in peers_of(rank, size) {
            match view.done.get(&peer) {
                Some(remote) => reports.extend(remote.iter().cloned()),
                None => reports.extend(lost_reports(config, peer)),
            }
        }

        Ok(Scheduler::summarize(
            RunReport::from_reports(reports).with_capabilities(table.snapshot()),
        ))
    }

    fn broadcast(&self, message: &CoordinationMessage) -> OrchestrationResult<()> {
        let rank = self.rank();
        let mut first_error = None;
        for peer in peers_of(rank, self.transport.size()) {
            if let Err(err) = self.transport.send(peer, message.clone()) {
                tracing::warn!(rank, peer, %err, message = message.name(), "send failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Loop de mensagens: roda até a thread principal sinalizar o fim
    fn dispatch<'scope, 'env>(
        &'env self,
        scope: &'scope Scope<'scope, 'env>,
        table: &'env Arc<CapabilityTable>,
        peers: &'env Peers,
        incoming: &'env Receiver<Incoming>,
        stop: &'env Receiver<()>,
    ) {
        let rank = self.rank();
        loop {
            let event = select! {
                recv(incoming) -> event => match event {
                    Ok(event) => event,
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            };

            match event {
                Incoming::Message(Envelope { from, message }) => match message {
                    CoordinationMessage::Hello => {}
                    CoordinationMessage::Announce { capabilities } => {
                        tracing::debug!(rank, from, count = capabilities.len(), "announce received");
                        peers.update(|s| {
                            s.announces.insert(from, capabilities);
                        });
                    }
                    CoordinationMessage::FetchRequest { capability } => {
                        let spawned = thread::Builder::new()
                            .name(format!("cassandra-serve-{capability}"))
                            .spawn_scoped(scope, move || self.serve(table, from, capability));
                        if let Err(err) = spawned {
                            tracing::error!(rank, from, %err, "failed to spawn serving thread");
                        }
                    }
                    CoordinationMessage::FetchReply { capability, outcome } => {
                        if let Err(err) = table.resolve_remote(&capability, outcome.into()) {
                            tracing::warn!(rank, from, %err, "reply for unknown capability");
                        }
                    }
                    CoordinationMessage::Done { reports } => {
                        tracing::debug!(rank, from, "done received");
                        peers.update(|s| {
                            s.done.insert(from, reports);
                        });
                    }
                },
                Incoming::Disconnected(peer) => {
                    // Marca antes de selar: coordinate relê `lost` depois de registrar
                    peers.update(|s| {
                        s.lost.insert(peer);
                    });
                    let failed = table.fail_rank(peer, &format!("rank {peer} disconnected"));
                    tracing::warn!(rank, peer, sealed = failed.len(), "peer lost");
                }
            }
        }
    }

    /// Espera a capacidade local e responde ao rank que pediu
    fn serve(&self, table: &CapabilityTable, to: Rank, capability: String) {
        let outcome = match table.fetch_for_peer(&capability, None) {
            Ok(value) => FetchOutcome::Published { value: (*value).clone() },
            Err(CapabilityError::DependencyFailed { reason, .. }) => FetchOutcome::Failed { reason },
            Err(err) => FetchOutcome::Failed { reason: err.to_string() },
        };
        if let Err(err) = self
            .transport
            .send(to, CoordinationMessage::FetchReply { capability, outcome })
        {
            tracing::warn!(rank = self.rank(), to, %err, "failed to send fetch reply");
        }
    }
}

impl std::fmt::Debug for RankNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankNode")
            .field("rank", &self.rank())
            .field("size", &self.transport.size())
            .finish()
    }
}

/// Relatórios sintéticos para os componentes de um rank perdido
fn lost_reports(config: &RunConfig, rank: Rank) -> Vec<ComponentReport> {
    config
        .components_for_rank(rank)
        .map(|(index, spec)| ComponentReport {
            index,
            name: spec.name.clone(),
            kind: spec.kind.clone(),
            rank,
            state: ComponentState::Failed,
            code: EXIT_PROTOCOL_ERROR,
            error: Some(format!("rank {rank} lost before reporting")),
            caused_by: None,
        })
        .collect()
}
