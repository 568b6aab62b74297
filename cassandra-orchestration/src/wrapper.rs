//! # Wrapper de Execução
//!
//! Conduz um componente pelo ciclo de vida:
//!
//! ```text
//! CREATED ──prepare()──► PARSED ──execute()──► RUNNING ──► FINISHED
//!    │                      │                     │
//!    └──────────────────────┴─────────────────────┴──────► FAILED
//! ```
//!
//! `prepare` roda o pré-passo do framework (parâmetros comuns) e depois os
//! passos do usuário (`initialize`, `finalize_parsing`). `execute` chama
//! `run` e decide o estado final. Em toda transição para FAILED as
//! capacidades ainda pendentes do componente são seladas como falhas.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use cassandra_core::error::EXIT_COMPONENT_ERROR;
use cassandra_core::{
    CapabilityError, CommonParams, Component, ComponentError, ComponentResult, ComponentState, EXIT_SUCCESS,
    ParamBundle,
};

use crate::capability::Rank;
use crate::handle::KernelHandle;
use crate::scheduler::ComponentReport;

/// Resultado de uma fase que falhou
#[derive(Debug, Clone)]
struct Failure {
    code: i32,
    message: String,
    /// Dono da dependência que causou a falha
    caused_by: Option<String>,
}

impl Failure {
    fn from_error(err: &ComponentError) -> Self {
        let caused_by = match err.as_capability_error() {
            Some(CapabilityError::DependencyFailed { owner, .. }) => Some(owner.clone()),
            _ => None,
        };
        Self {
            code: err.exit_code(),
            message: err.to_string(),
            caused_by,
        }
    }
}

/// Dono do componente do usuário durante uma execução
#[derive(Debug)]
pub struct ComponentWrapper {
    index: usize,
    component: Box<dyn Component>,
    handle: Arc<KernelHandle>,
    params: ParamBundle,
    failure: Option<Failure>,
}

impl ComponentWrapper {
    /// Wrapper em CREATED; nenhuma capacidade exposta ainda
    pub fn new(
        index: usize,
        component: Box<dyn Component>,
        handle: KernelHandle,
        params: ParamBundle,
    ) -> Self {
        Self {
            index,
            component,
            handle: Arc::new(handle),
            params,
            failure: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        cassandra_core::CapabilityContext::component(&*self.handle)
    }

    pub fn rank(&self) -> Rank {
        self.handle.rank()
    }

    pub fn state(&self) -> ComponentState {
        self.handle.state()
    }

    pub fn handle(&self) -> &Arc<KernelHandle> {
        &self.handle
    }

    /// Fase de parsing: CREATED → PARSED (ou FAILED)
    pub fn prepare(&mut self) -> ComponentState {
        if self.state() != ComponentState::Created {
            return self.state();
        }

        let handle = Arc::clone(&self.handle);
        let params = &self.params;
        let component = &mut self.component;

        let outcome = guarded(|| {
            let common = CommonParams::from_params(params)?;
            handle.set_common(common);
            component.initialize(&*handle)?;
            component.finalize_parsing(&*handle, params)
        });

        match outcome {
            Ok(()) => {
                self.handle.transition(ComponentState::Parsed);
            }
            Err(err) => self.fail(Failure::from_error(&err)),
        }
        self.state()
    }

    /// Fase de execução: PARSED → RUNNING → FINISHED | FAILED
    pub fn execute(&mut self) -> ComponentState {
        if self.state() != ComponentState::Parsed {
            return self.state();
        }
        self.handle.transition(ComponentState::Running);

        let handle = Arc::clone(&self.handle);
        let component = &mut self.component;
        let outcome = guarded(|| component.run(&*handle));

        match outcome {
            Ok(EXIT_SUCCESS) => {
                let table = self.handle.table();
                let pending = table.unpublished(self.name());
                if pending.is_empty() {
                    self.handle.transition(ComponentState::Finished);
                } else {
                    let err = ComponentError::from(CapabilityError::UnpublishedCapability {
                        component: self.name().to_string(),
                        capabilities: pending,
                    });
                    self.fail(Failure::from_error(&err));
                }
            }
            Ok(status) => self.fail(Failure {
                code: status,
                message: format!("run returned status {status}"),
                caused_by: None,
            }),
            Err(err) => self.fail(Failure::from_error(&err)),
        }
        self.state()
    }

    /// Recusa o componente antes do parsing: CREATED → FAILED.
    ///
    /// Não toca na tabela; o nome pode pertencer a outro componente.
    pub(crate) fn reject(&mut self, err: CapabilityError) {
        let failure = Failure::from_error(&ComponentError::from(err));
        tracing::warn!(component = %self.name(), code = failure.code, error = %failure.message, "component rejected");
        self.handle.transition(ComponentState::Failed);
        self.failure = Some(failure);
    }

    /// Falha externa ao componente (ex.: thread não pôde ser criada)
    pub(crate) fn abort(&mut self, message: String) {
        if self.failure.is_none() && self.state() != ComponentState::Finished {
            self.fail(Failure {
                code: EXIT_COMPONENT_ERROR,
                message,
                caused_by: None,
            });
        }
    }

    /// Marca FAILED e acorda quem espera pelas capacidades pendentes
    fn fail(&mut self, failure: Failure) {
        let name = self.name().to_string();
        tracing::warn!(component = %name, code = failure.code, error = %failure.message, "component failed");

        if !self.state().is_terminal() {
            self.handle.transition(ComponentState::Failed);
        }
        let reason = format!("{name} failed with code {}: {}", failure.code, failure.message);
        self.handle.table().fail_owner(&name, &reason);
        self.failure = Some(failure);
    }

    /// Linha do relatório para este componente
    pub fn report(&self) -> ComponentReport {
        let state = self.state();
        let (code, error, caused_by) = match &self.failure {
            Some(f) => (f.code, Some(f.message.clone()), f.caused_by.clone()),
            None => (EXIT_SUCCESS, None, None),
        };
        ComponentReport {
            index: self.index,
            name: self.name().to_string(),
            kind: self.component.kind().to_string(),
            rank: self.rank(),
            state,
            code,
            error,
            caused_by,
        }
    }
}

/// Executa um passo do usuário convertendo pânico em erro
fn guarded<T>(step: impl FnOnce() -> ComponentResult<T>) -> ComponentResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(ComponentError::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassandra_core::error::{EXIT_PANIC, EXIT_UNPUBLISHED};
    use cassandra_core::CapabilityContext;
    use serde_json::json;
    use crate::capability::CapabilityTable;

    #[derive(Debug)]
    struct Producer {
        publish: bool,
        status: i32,
    }

    impl Component for Producer {
        fn kind(&self) -> &str {
            "Producer"
        }

        fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
            ctx.register("temp")?;
            Ok(())
        }

        fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
            if self.publish {
                ctx.publish("temp", json!(42))?;
            }
            Ok(self.status)
        }
    }

    #[derive(Debug)]
    struct Panicky;

    impl Component for Panicky {
        fn kind(&self) -> &str {
            "Panicky"
        }

        fn initialize(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<()> {
            Ok(())
        }

        fn run(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
            panic!("boom");
        }
    }

    fn wrap(table: &Arc<CapabilityTable>, component: Box<dyn Component>, params: ParamBundle) -> ComponentWrapper {
        let kind = component.kind().to_string();
        let handle = KernelHandle::new("A", kind, Arc::clone(table));
        ComponentWrapper::new(0, component, handle, params)
    }

    #[test]
    fn test_happy_path() {
        let table = Arc::new(CapabilityTable::new());
        let mut w = wrap(&table, Box::new(Producer { publish: true, status: 0 }), ParamBundle::new());

        assert_eq!(w.prepare(), ComponentState::Parsed);
        table.close_registration();
        assert_eq!(w.execute(), ComponentState::Finished);

        let report = w.report();
        assert_eq!(report.code, 0);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_unpublished_capability_fails() {
        let table = Arc::new(CapabilityTable::new());
        let mut w = wrap(&table, Box::new(Producer { publish: false, status: 0 }), ParamBundle::new());

        w.prepare();
        table.close_registration();
        assert_eq!(w.execute(), ComponentState::Failed);
        assert_eq!(w.report().code, EXIT_UNPUBLISHED);

        // Consumidores não ficam presos
        let err = table.fetch("temp", "B", None).unwrap_err();
        assert!(matches!(err, CapabilityError::DependencyFailed { .. }));
    }

    #[test]
    fn test_nonzero_status_is_verbatim() {
        let table = Arc::new(CapabilityTable::new());
        let mut w = wrap(&table, Box::new(Producer { publish: true, status: 7 }), ParamBundle::new());

        w.prepare();
        table.close_registration();
        assert_eq!(w.execute(), ComponentState::Failed);
        assert_eq!(w.report().code, 7);
    }

    #[test]
    fn test_panic_is_caught() {
        let table = Arc::new(CapabilityTable::new());
        let mut w = wrap(&table, Box::new(Panicky), ParamBundle::new());

        w.prepare();
        table.close_registration();
        assert_eq!(w.execute(), ComponentState::Failed);

        let report = w.report();
        assert_eq!(report.code, EXIT_PANIC);
        assert!(report.error.unwrap().contains("boom"));
    }

    #[test]
    fn test_bad_common_param_fails_parsing() {
        let table = Arc::new(CapabilityTable::new());
        let params = ParamBundle::new().with("clobber", "maybe");
        let mut w = wrap(&table, Box::new(Producer { publish: true, status: 0 }), params);

        assert_eq!(w.prepare(), ComponentState::Failed);
        // Falhou antes de executar: execute não muda nada
        assert_eq!(w.execute(), ComponentState::Failed);
        assert_eq!(w.report().code, 1);
    }

    #[test]
    fn test_common_params_reach_component() {
        let table = Arc::new(CapabilityTable::new());
        let params = ParamBundle::new().with("clobber", "False");
        let mut w = wrap(&table, Box::new(Producer { publish: true, status: 0 }), params);

        w.prepare();
        assert!(!w.handle().common().clobber);
    }
}
