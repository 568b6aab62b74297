//! Handle do kernel entregue a cada componente
//!
//! O [`KernelHandle`] é a metade imutável do wrapper: identidade, rank,
//! referência à tabela e célula de estado compartilhada. O componente do
//! usuário só o enxerga como `&dyn CapabilityContext`.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use cassandra_core::{
    CapabilityContext, CapabilityError, CapabilityValue, CommonParams, ComponentState, SharedValue,
};

use crate::capability::{CapabilityTable, Rank};
use crate::events::LifecycleEvent;

static DEFAULT_COMMON: CommonParams = CommonParams { clobber: true };

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS CELL
// ═══════════════════════════════════════════════════════════════════════════════

/// Estado atual de um componente, compartilhado entre wrapper e handle
#[derive(Debug, Default)]
pub struct StatusCell {
    state: Mutex<ComponentState>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ComponentState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move para `next` se a transição for válida; retorna o estado anterior
    pub fn transition(&self, next: ComponentState) -> Option<ComponentState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous.can_transition_to(next) {
            *state = next;
            Some(previous)
        } else {
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KERNEL HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Acesso de um componente à tabela de capacidades
#[derive(Debug)]
pub struct KernelHandle {
    name: String,
    kind: String,
    rank: Rank,
    table: Arc<CapabilityTable>,
    status: Arc<StatusCell>,
    common: OnceLock<CommonParams>,
    fetch_timeout: Option<Duration>,
}

impl KernelHandle {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, table: Arc<CapabilityTable>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            rank: 0,
            table,
            status: Arc::new(StatusCell::new()),
            common: OnceLock::new(),
            fetch_timeout: None,
        }
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn state(&self) -> ComponentState {
        self.status.get()
    }

    pub fn status(&self) -> &Arc<StatusCell> {
        &self.status
    }

    pub fn table(&self) -> &Arc<CapabilityTable> {
        &self.table
    }

    /// Fixa os parâmetros comuns (pré-passo do framework, uma vez)
    pub(crate) fn set_common(&self, common: CommonParams) {
        let _ = self.common.set(common);
    }

    /// Transição de estado com log e evento; `false` se inválida
    pub(crate) fn transition(&self, next: ComponentState) -> bool {
        match self.status.transition(next) {
            Some(from) => {
                tracing::info!(component = %self.name, %from, to = %next, "state changed");
                self.table.emit(LifecycleEvent::StateChanged {
                    component: self.name.clone(),
                    from,
                    to: next,
                });
                true
            }
            None => {
                tracing::warn!(
                    component = %self.name,
                    from = %self.status.get(),
                    to = %next,
                    "invalid state transition ignored"
                );
                false
            }
        }
    }
}

impl CapabilityContext for KernelHandle {
    fn component(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn common(&self) -> &CommonParams {
        self.common.get().unwrap_or(&DEFAULT_COMMON)
    }

    fn register(&self, capability: &str) -> Result<(), CapabilityError> {
        self.table.register(capability, &self.name)
    }

    fn publish(&self, capability: &str, value: CapabilityValue) -> Result<(), CapabilityError> {
        let state = self.status.get();
        if state != ComponentState::Running {
            return Err(CapabilityError::NotRunning {
                capability: capability.to_string(),
                component: self.name.clone(),
                state,
            });
        }
        self.table.publish(capability, &self.name, value)
    }

    fn fetch(&self, capability: &str) -> Result<SharedValue, CapabilityError> {
        tracing::debug!(component = %self.name, capability, "fetch");

        // Só em RUNNING; SelfFetch tem precedência
        let state = self.status.get();
        let own = self.table.get(capability).is_some_and(|e| e.owner() == self.name);
        if state != ComponentState::Running && !own {
            return Err(CapabilityError::FetchOutsideRunning {
                capability: capability.to_string(),
                component: self.name.clone(),
                state,
            });
        }
        self.table.fetch(capability, &self.name, self.fetch_timeout)
    }
}
