//! Orquestrador: configuração + factory → execução local ou distribuída

use std::sync::Arc;

use crate::config::RunConfig;
use crate::distributed::{RankNode, TcpTransport, Transport};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::events::EventBus;
use crate::factory::ComponentFactory;
use crate::capability::Rank;
use crate::scheduler::{ComponentSlot, RunReport, Scheduler};

/// Ponto de entrada de uma execução
#[derive(Debug)]
pub struct Orchestrator {
    config: RunConfig,
    factory: ComponentFactory,
    events: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// Valida a configuração e guarda a factory
    pub fn new(config: RunConfig, factory: ComponentFactory) -> OrchestrationResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            events: None,
        })
    }

    /// Publica eventos de ciclo de vida no bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn factory(&self) -> &ComponentFactory {
        &self.factory
    }

    fn scheduler(&self) -> Scheduler {
        let scheduler = Scheduler::new(self.config.scheduler.clone());
        match &self.events {
            Some(events) => scheduler.with_events(Arc::clone(events)),
            None => scheduler,
        }
    }

    /// Instancia todos os componentes (na ordem da configuração)
    fn slots(&self) -> OrchestrationResult<Vec<ComponentSlot>> {
        self.config
            .components
            .iter()
            .enumerate()
            .map(|(index, spec)| -> OrchestrationResult<ComponentSlot> {
                Ok(ComponentSlot::new(&spec.name, self.factory.create(&spec.kind)?)
                    .with_params(spec.params.clone())
                    .with_index(index)
                    .with_rank(spec.rank))
            })
            .collect()
    }

    /// Todos os componentes neste processo, ignorando `rank`
    pub fn run_local(&self) -> OrchestrationResult<RunReport> {
        let slots = self.slots()?;
        tracing::info!(components = slots.len(), "starting local run");
        Ok(self.scheduler().run(slots))
    }

    /// Só a fase de parsing: valida parâmetros e registros sem executar
    pub fn check(&self) -> OrchestrationResult<RunReport> {
        let scheduler = self.scheduler();
        let table = scheduler.new_table();
        let wrappers = scheduler.prepare(&table, self.slots()?);
        table.close_registration();
        Ok(Scheduler::report(&table, &wrappers))
    }

    /// Parte deste rank numa execução distribuída via TCP
    pub fn run_rank(&self, rank: Rank) -> OrchestrationResult<RunReport> {
        let cluster = self.config.cluster.as_ref().ok_or_else(|| {
            OrchestrationError::InvalidConfiguration("distributed run without [cluster]".to_string())
        })?;
        let transport = TcpTransport::bind(rank, cluster)?;
        self.run_with_transport(Arc::new(transport))
    }

    /// Parte deste rank sobre um transporte qualquer
    pub fn run_with_transport(&self, transport: Arc<dyn Transport>) -> OrchestrationResult<RunReport> {
        let rank = transport.rank();
        tracing::info!(rank, ranks = transport.size(), "starting distributed run");
        RankNode::new(transport, self.scheduler()).run(&self.config, &self.factory)
    }

    /// Local se houver um rank só; distribuída caso contrário
    pub fn run(&self, rank: Rank) -> OrchestrationResult<RunReport> {
        if self.config.rank_count() > 1 {
            self.run_rank(rank)
        } else {
            self.run_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentSpec;

    #[test]
    fn test_unknown_kind_is_reported() {
        let config = RunConfig::default().with_component(ComponentSpec::new("HydroComponent"));
        let orch = Orchestrator::new(config, ComponentFactory::with_builtins()).unwrap();
        assert!(matches!(orch.run_local(), Err(OrchestrationError::ComponentNotFound(_))));
    }

    #[test]
    fn test_check_does_not_run() {
        let config = RunConfig::default().with_component(
            ComponentSpec::new("ExecComponent")
                .with_param("command", "false")
                .with_param("capability", "never"),
        );
        let orch = Orchestrator::new(config, ComponentFactory::with_builtins()).unwrap();

        let report = orch.check().unwrap();
        assert!(report.success);
        assert_eq!(report.components[0].state, cassandra_core::ComponentState::Parsed);
        assert_eq!(report.capabilities[0].name, "never");
    }

    #[test]
    fn test_distributed_run_requires_cluster() {
        let orch = Orchestrator::new(RunConfig::default(), ComponentFactory::new()).unwrap();
        assert!(matches!(orch.run_rank(0), Err(OrchestrationError::InvalidConfiguration(_))));
    }
}
