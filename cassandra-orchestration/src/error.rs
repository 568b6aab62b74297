//! Erros de orquestração

use thiserror::Error;
use cassandra_core::{CapabilityError, ComponentError};

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Erros de orquestração
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Erro do protocolo de capacidades
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Erro de componente
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// Tipo de componente desconhecido pela factory
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Nome de instância repetido na configuração
    #[error("Component already registered: {0}")]
    ComponentAlreadyRegistered(String),

    /// Configuração inválida
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Falha de transporte entre ranks
    #[error("Transport error: {0}")]
    Transport(String),

    /// Falha de (de)serialização
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Erro de IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Lock poison
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for OrchestrationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        OrchestrationError::LockPoisoned(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(err: serde_json::Error) -> Self {
        OrchestrationError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for OrchestrationError {
    fn from(err: toml::de::Error) -> Self {
        OrchestrationError::InvalidConfiguration(err.to_string())
    }
}
