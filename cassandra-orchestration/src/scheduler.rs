//! # Scheduler de Execução
//!
//! Uma execução tem duas fases separadas por uma barreira:
//!
//! 1. **Parsing** (sequencial, em ordem de registro): cada wrapper roda
//!    `prepare()` e declara suas capacidades.
//! 2. **Execução** (concorrente): a janela de registro fecha e cada
//!    componente em PARSED ganha sua própria thread para `run`.
//!
//! O scheduler espera todas as threads e agrega um [`RunReport`].

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use cassandra_core::{CapabilityError, Component, ComponentState, ParamBundle, EXIT_SUCCESS};

use crate::capability::{CapabilityInfo, CapabilityTable, Rank};
use crate::events::EventBus;
use crate::handle::KernelHandle;
use crate::wrapper::ComponentWrapper;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURAÇÃO
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuração do scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Timeout de fetch em ms (ausente = espera indefinida)
    pub fetch_timeout_ms: Option<u64>,
    /// Prefixo do nome das threads de componente
    pub thread_name_prefix: String,
    /// Tamanho de pilha das threads (ausente = padrão da plataforma)
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: None,
            thread_name_prefix: "cassandra-".to_string(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RELATÓRIO
// ═══════════════════════════════════════════════════════════════════════════════

/// Resultado de um componente
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReport {
    /// Posição na ordem de registro (global)
    pub index: usize,
    pub name: String,
    pub kind: String,
    pub rank: Rank,
    pub state: ComponentState,
    /// 0 ou o código da falha
    pub code: i32,
    pub error: Option<String>,
    /// Componente cuja falha causou esta (via `DependencyFailed`)
    pub caused_by: Option<String>,
}

impl ComponentReport {
    pub fn is_failed(&self) -> bool {
        self.state == ComponentState::Failed
    }
}

/// Resultado de uma execução completa
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Um relatório por componente, em ordem de registro
    pub components: Vec<ComponentReport>,
    /// Nenhum componente em FAILED
    pub success: bool,
    /// 0 ou o código da falha de menor índice
    pub exit_code: i32,
    /// Capacidades e seu estado final
    #[serde(default)]
    pub capabilities: Vec<CapabilityInfo>,
}

impl RunReport {
    /// Agrega relatórios (em qualquer ordem)
    pub fn from_reports(mut components: Vec<ComponentReport>) -> Self {
        components.sort_by_key(|c| c.index);
        let exit_code = components
            .iter()
            .find(|c| c.is_failed())
            .map_or(EXIT_SUCCESS, |c| c.code);
        let success = components.iter().all(|c| !c.is_failed());
        Self {
            success,
            exit_code,
            components,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<CapabilityInfo>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Componentes em FAILED, em ordem de registro
    pub fn failed(&self) -> impl Iterator<Item = &ComponentReport> {
        self.components.iter().filter(|c| c.is_failed())
    }

    pub fn get(&self, name: &str) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Da primeira falha até a causa raiz, seguindo `caused_by`
    pub fn failure_chain(&self) -> Vec<&ComponentReport> {
        let mut chain: Vec<&ComponentReport> = Vec::new();
        let mut current = self.failed().next();

        while let Some(report) = current {
            if chain.iter().any(|c| c.name == report.name) {
                break;
            }
            chain.push(report);
            current = report.caused_by.as_deref().and_then(|owner| self.get(owner));
        }
        chain
    }

    /// Causa raiz da falha da execução
    pub fn root_cause(&self) -> Option<&ComponentReport> {
        self.failure_chain().last().copied()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

/// Componente pronto para ser agendado
#[derive(Debug)]
pub struct ComponentSlot {
    pub name: String,
    pub component: Box<dyn Component>,
    pub params: ParamBundle,
    /// Índice global; ausente = posição na lista
    pub index: Option<usize>,
    pub rank: Rank,
}

impl ComponentSlot {
    pub fn new(name: impl Into<String>, component: Box<dyn Component>) -> Self {
        Self {
            name: name.into(),
            component,
            params: ParamBundle::new(),
            index: None,
            rank: 0,
        }
    }

    pub fn with_params(mut self, params: ParamBundle) -> Self {
        self.params = params;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = rank;
        self
    }
}

/// Scheduler de uma execução
#[derive(Debug, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
    events: Option<Arc<EventBus>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config, events: None }
    }

    /// Emite eventos de ciclo de vida no bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Tabela nova para uma execução
    pub fn new_table(&self) -> Arc<CapabilityTable> {
        match &self.events {
            Some(events) => Arc::new(CapabilityTable::with_events(Arc::clone(events))),
            None => Arc::new(CapabilityTable::new()),
        }
    }

    /// Execução local completa: parsing, barreira, execução, relatório
    pub fn run(&self, components: Vec<ComponentSlot>) -> RunReport {
        let table = self.new_table();
        let mut wrappers = self.prepare(&table, components);
        table.close_registration();
        self.execute(&mut wrappers);
        Self::report(&table, &wrappers)
    }

    /// Fase de parsing: cria os wrappers e roda `prepare` em ordem
    pub fn prepare(
        &self,
        table: &Arc<CapabilityTable>,
        components: Vec<ComponentSlot>,
    ) -> Vec<ComponentWrapper> {
        let timeout = self.config.fetch_timeout();
        let mut names = HashSet::new();
        components
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                let index = slot.index.unwrap_or(position);
                let unique = names.insert(slot.name.clone());
                let handle = KernelHandle::new(&slot.name, slot.component.kind(), Arc::clone(table))
                    .with_rank(slot.rank)
                    .with_fetch_timeout(timeout);
                let mut wrapper = ComponentWrapper::new(index, slot.component, handle, slot.params);
                // O nome identifica o dono das capacidades
                if unique {
                    wrapper.prepare();
                } else {
                    wrapper.reject(CapabilityError::DuplicateComponent(slot.name));
                }
                wrapper
            })
            .collect()
    }

    /// Fase de execução: uma thread por componente em PARSED
    pub fn execute(&self, wrappers: &mut [ComponentWrapper]) {
        let mut spawn_failures = Vec::new();

        thread::scope(|scope| {
            let mut running = Vec::new();

            for wrapper in wrappers.iter_mut() {
                if wrapper.state() != ComponentState::Parsed {
                    continue;
                }
                let index = wrapper.index();
                let name = wrapper.name().to_string();
                let handle = Arc::clone(wrapper.handle());

                let mut builder =
                    thread::Builder::new().name(format!("{}{}", self.config.thread_name_prefix, name));
                if let Some(bytes) = self.config.stack_size {
                    builder = builder.stack_size(bytes);
                }

                match builder.spawn_scoped(scope, move || wrapper.execute()) {
                    Ok(join) => running.push((name, join)),
                    Err(err) => {
                        // Sela já: dependentes não podem ficar esperando
                        let reason = format!("failed to spawn thread: {err}");
                        handle.transition(ComponentState::Failed);
                        handle.table().fail_owner(&name, &reason);
                        spawn_failures.push((index, reason));
                    }
                }
            }

            for (name, join) in running {
                if join.join().is_err() {
                    tracing::error!(component = %name, "component thread panicked outside the wrapper");
                }
            }
        });

        for (index, reason) in spawn_failures {
            if let Some(wrapper) = wrappers.iter_mut().find(|w| w.index() == index) {
                wrapper.abort(reason);
            }
        }
    }

    /// Agrega os relatórios dos wrappers
    pub fn report(table: &CapabilityTable, wrappers: &[ComponentWrapper]) -> RunReport {
        Self::summarize(
            RunReport::from_reports(wrappers.iter().map(ComponentWrapper::report).collect())
                .with_capabilities(table.snapshot()),
        )
    }

    /// Registra o resumo da execução no log
    pub(crate) fn summarize(report: RunReport) -> RunReport {
        if report.success {
            tracing::info!(components = report.components.len(), "run finished");
        } else {
            tracing::warn!(
                failed = report.failed().count(),
                exit_code = report.exit_code,
                "run failed"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: usize, name: &str, code: i32, caused_by: Option<&str>) -> ComponentReport {
        ComponentReport {
            index,
            name: name.into(),
            kind: "Test".into(),
            rank: 0,
            state: if code == 0 { ComponentState::Finished } else { ComponentState::Failed },
            code,
            error: None,
            caused_by: caused_by.map(String::from),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.fetch_timeout().is_none());
        assert_eq!(config.thread_name_prefix, "cassandra-");

        let config = config.with_fetch_timeout(Duration::from_secs(2));
        assert_eq!(config.fetch_timeout_ms, Some(2000));
    }

    #[test]
    fn test_exit_code_is_lowest_index_failure() {
        let run = RunReport::from_reports(vec![
            report(2, "C", 1, None),
            report(0, "A", 0, None),
            report(1, "B", 3, Some("C")),
        ]);
        assert!(!run.success);
        assert_eq!(run.exit_code, 3);
        assert_eq!(run.components[0].name, "A");
    }

    #[test]
    fn test_failure_chain_follows_dependencies() {
        let run = RunReport::from_reports(vec![
            report(0, "D", 3, Some("B")),
            report(1, "B", 3, Some("A")),
            report(2, "A", 1, None),
        ]);
        let chain: Vec<_> = run.failure_chain().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(chain, vec!["D", "B", "A"]);
        assert_eq!(run.root_cause().unwrap().code, 1);
    }

    #[test]
    fn test_success_report() {
        let run = RunReport::from_reports(vec![report(0, "A", 0, None)]);
        assert!(run.success);
        assert_eq!(run.exit_code, 0);
        assert!(run.failure_chain().is_empty());
    }
}
