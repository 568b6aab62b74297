//! # Barramento de Eventos do Ciclo de Vida
//!
//! Barramento MPMC para eventos do kernel: transições de estado, registros,
//! publicações e falhas. Usa canais crossbeam; emitir nunca bloqueia a
//! thread do componente que gerou o evento.
//!
//! ## Uso
//!
//! ```ignore
//! use cassandra_orchestration::events::{EventBus, EventFilter};
//!
//! let bus = EventBus::new();
//! let failures = bus.subscribe_filtered(EventFilter::Failures);
//!
//! // ... execução ...
//!
//! for event in failures.try_iter() {
//!     eprintln!("{event:?}");
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use crossbeam_utils::sync::ShardedLock;
use serde::{Deserialize, Serialize};
use cassandra_core::ComponentState;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTOS
// ═══════════════════════════════════════════════════════════════════════════════

/// Evento do ciclo de vida do kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Componente mudou de estado
    StateChanged {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },
    /// Entrada de capacidade criada
    CapabilityRegistered { capability: String, owner: String },
    /// Capacidade selada com valor
    CapabilityPublished { capability: String, owner: String },
    /// Capacidade selada como falha (dono chegou a FAILED)
    CapabilityFailed {
        capability: String,
        owner: String,
        reason: String,
    },
    /// Janela de registro fechada; começa a fase de execução
    RegistrationClosed { capabilities: usize },
}

impl LifecycleEvent {
    /// Componente do evento (o dono, para eventos de capacidade)
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::StateChanged { component, .. } => Some(component),
            Self::CapabilityRegistered { owner, .. }
            | Self::CapabilityPublished { owner, .. }
            | Self::CapabilityFailed { owner, .. } => Some(owner),
            Self::RegistrationClosed { .. } => None,
        }
    }

    /// Capacidade do evento
    pub fn capability(&self) -> Option<&str> {
        match self {
            Self::CapabilityRegistered { capability, .. }
            | Self::CapabilityPublished { capability, .. }
            | Self::CapabilityFailed { capability, .. } => Some(capability),
            _ => None,
        }
    }
}

/// Filtro de assinatura
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Todos os eventos
    All,
    /// Eventos de um componente
    Component(String),
    /// Eventos de uma capacidade
    Capability(String),
    /// Só transições de estado
    StateChanges,
    /// Transições para FAILED e capacidades falhas
    Failures,
}

impl EventFilter {
    /// O evento passa por este filtro?
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Component(name) => event.component() == Some(name.as_str()),
            EventFilter::Capability(name) => event.capability() == Some(name.as_str()),
            EventFilter::StateChanges => matches!(event, LifecycleEvent::StateChanged { .. }),
            EventFilter::Failures => matches!(
                event,
                LifecycleEvent::StateChanged { to: ComponentState::Failed, .. }
                    | LifecycleEvent::CapabilityFailed { .. }
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BARRAMENTO
// ═══════════════════════════════════════════════════════════════════════════════

/// Barramento de eventos sobre canais MPMC crossbeam
pub struct EventBus {
    /// Emissores de broadcast
    senders: Arc<ShardedLock<Vec<FilteredSender>>>,
    /// Contador de eventos (atômico)
    event_count: AtomicU64,
    /// Contador de assinantes (atômico)
    subscriber_count: AtomicUsize,
    /// Capacidade do canal (0 = ilimitado)
    capacity: usize,
}

/// Emissor com filtro associado
struct FilteredSender {
    filter: EventFilter,
    sender: Sender<LifecycleEvent>,
    /// Receptor descartado (visto no emit)
    disconnected: AtomicBool,
}

/// Handle de assinatura (receptor)
pub struct Subscription {
    receiver: Receiver<LifecycleEvent>,
    filter: EventFilter,
}

impl EventBus {
    /// Cria barramento ilimitado
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Cria barramento limitado; assinantes cheios perdem eventos
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: Arc::new(ShardedLock::new(Vec::new())),
            event_count: AtomicU64::new(0),
            subscriber_count: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Assina todos os eventos
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_filtered(EventFilter::All)
    }

    /// Assina com filtro
    pub fn subscribe_filtered(&self, filter: EventFilter) -> Subscription {
        let (sender, receiver) = if self.capacity > 0 {
            bounded(self.capacity)
        } else {
            unbounded()
        };

        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FilteredSender {
                filter: filter.clone(),
                sender,
                disconnected: AtomicBool::new(false),
            });

        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        Subscription { receiver, filter }
    }

    /// Emite para os assinantes cujo filtro aceita (não bloqueia)
    pub fn emit(&self, event: LifecycleEvent) {
        self.event_count.fetch_add(1, Ordering::Relaxed);

        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        for fs in senders.iter() {
            if fs.filter.matches(&event) {
                match fs.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Disconnected(_)) => {
                        fs.disconnected.store(true, Ordering::Relaxed);
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!("event subscriber full, dropping {:?}", event);
                    }
                }
            }
        }
    }

    /// Número de eventos emitidos
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    /// Número de assinantes registrados
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Remove emissores cuja assinatura foi descartada (detectado no emit)
    pub fn cleanup(&self) {
        let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
        let initial_len = senders.len();

        senders.retain(|fs| !fs.disconnected.load(Ordering::Relaxed));

        let removed = initial_len - senders.len();
        if removed > 0 {
            self.subscriber_count.fetch_sub(removed, Ordering::Relaxed);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_count", &self.event_count())
            .field("subscriber_count", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSINATURA
// ═══════════════════════════════════════════════════════════════════════════════

impl Subscription {
    /// Tenta receber o próximo evento (não bloqueia)
    pub fn try_recv(&self) -> Option<LifecycleEvent> {
        self.receiver.try_recv().ok()
    }

    /// Recebe com timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LifecycleEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Número de eventos pendentes
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Filtro desta assinatura
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Drena eventos pendentes (não bloqueia)
    pub fn try_iter(&self) -> impl Iterator<Item = LifecycleEvent> + '_ {
        self.receiver.try_iter()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTES
// ═══════════════════════════════════════════════════════════════════════════════
