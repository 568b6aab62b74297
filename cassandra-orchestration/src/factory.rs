//! Factory de componentes: tipo (string da configuração) → construtor

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use cassandra_core::Component;

use crate::components::{ExecComponent, GlobalParamsComponent};
use crate::config::GLOBAL_KIND;
use crate::error::{OrchestrationError, OrchestrationResult};

/// Construtor de um tipo de componente
pub type Constructor = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Mapeia tipos de componente para construtores
#[derive(Clone, Default)]
pub struct ComponentFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl ComponentFactory {
    /// Factory vazia
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory com os componentes genéricos do kernel
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.insert(GLOBAL_KIND, || Box::new(GlobalParamsComponent::new()));
        factory.insert(ExecComponent::KIND, || Box::new(ExecComponent::new()));
        factory
    }

    fn insert<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.to_string(), Arc::new(constructor));
    }

    /// Registra um tipo; falha se o nome já existe
    pub fn register<F>(&mut self, kind: &str, constructor: F) -> OrchestrationResult<()>
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(kind) {
            return Err(OrchestrationError::ComponentAlreadyRegistered(kind.to_string()));
        }
        self.insert(kind, constructor);
        Ok(())
    }

    /// Builder: registra (substituindo) um tipo
    pub fn with<F>(mut self, kind: &str, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.insert(kind, constructor);
        self
    }

    /// Instancia um componente do tipo `kind`
    pub fn create(&self, kind: &str) -> OrchestrationResult<Box<dyn Component>> {
        self.constructors
            .get(kind)
            .map(|constructor| constructor())
            .ok_or_else(|| OrchestrationError::ComponentNotFound(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Tipos registrados, em ordem alfabética
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}
