//! Erros do protocolo de capacidades e dos componentes

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ComponentState;

/// Código de saída para erros genéricos de componente
pub const EXIT_COMPONENT_ERROR: i32 = 1;
/// Código de saída para violações do protocolo de capacidades
pub const EXIT_PROTOCOL_ERROR: i32 = 2;
/// Código de saída quando uma dependência falhou
pub const EXIT_DEPENDENCY_FAILED: i32 = 3;
/// Código de saída para capacidades declaradas e nunca publicadas
pub const EXIT_UNPUBLISHED: i32 = 4;
/// Código de saída para fetch com timeout expirado
pub const EXIT_FETCH_TIMEOUT: i32 = 5;
/// Código de saída para pânico na função de trabalho
pub const EXIT_PANIC: i32 = 101;

/// Erros das operações `register` / `publish` / `fetch`
///
/// Todos são síncronos e locais a quem chamou: nenhum é engolido.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CapabilityError {
    /// Capacidade já registrada por outro componente
    #[error("Capability '{capability}' already registered by '{owner}' (requested by '{requested_by}')")]
    DuplicateCapability {
        capability: String,
        owner: String,
        requested_by: String,
    },

    /// Registro tentado depois do início da fase de execução
    #[error("Registration window closed: '{component}' cannot register '{capability}'")]
    RegistrationWindowClosed {
        capability: String,
        component: String,
    },

    /// Publicação por quem não é dono
    #[error("Component '{caller}' does not own capability '{capability}' (owner: '{owner}')")]
    NotOwner {
        capability: String,
        owner: String,
        caller: String,
    },

    /// Segunda publicação do mesmo nome
    #[error("Capability already published: {0}")]
    AlreadyPublished(String),

    /// Produtor tentando consumir o próprio produto
    #[error("Component '{component}' cannot fetch its own capability '{capability}'")]
    SelfFetch {
        capability: String,
        component: String,
    },

    /// Nome nunca registrado
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    /// Componente terminou com status 0 sem publicar o que declarou
    #[error("Component '{component}' finished without publishing: {}", capabilities.join(", "))]
    UnpublishedCapability {
        component: String,
        capabilities: Vec<String>,
    },

    /// O dono da capacidade chegou a FAILED antes de publicar
    #[error("Dependency failed: capability '{capability}' owned by '{owner}': {reason}")]
    DependencyFailed {
        capability: String,
        owner: String,
        reason: String,
    },

    /// Publicação fora da fase RUNNING do dono
    #[error("Component '{component}' cannot publish '{capability}' while {state}")]
    NotRunning {
        capability: String,
        component: String,
        state: ComponentState,
    },

    /// Fetch fora da fase RUNNING de quem pede (ex.: em `initialize`)
    #[error("Component '{component}' cannot fetch '{capability}' while {state}")]
    FetchOutsideRunning {
        capability: String,
        component: String,
        state: ComponentState,
    },

    /// Nome de instância já usado por outro componente da execução
    #[error("Component name already in use: {0}")]
    DuplicateComponent(String),

    /// Timeout opcional de fetch expirou
    #[error("Timed out after {timeout_ms}ms waiting for capability '{capability}'")]
    FetchTimeout { capability: String, timeout_ms: u64 },
}

impl CapabilityError {
    /// Código de saída associado ao erro
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DependencyFailed { .. } => EXIT_DEPENDENCY_FAILED,
            Self::UnpublishedCapability { .. } => EXIT_UNPUBLISHED,
            Self::FetchTimeout { .. } => EXIT_FETCH_TIMEOUT,
            _ => EXIT_PROTOCOL_ERROR,
        }
    }

    /// Nome da capacidade envolvida (quando há uma só)
    pub fn capability(&self) -> Option<&str> {
        match self {
            Self::DuplicateCapability { capability, .. }
            | Self::RegistrationWindowClosed { capability, .. }
            | Self::NotOwner { capability, .. }
            | Self::SelfFetch { capability, .. }
            | Self::DependencyFailed { capability, .. }
            | Self::NotRunning { capability, .. }
            | Self::FetchOutsideRunning { capability, .. }
            | Self::FetchTimeout { capability, .. } => Some(capability),
            Self::AlreadyPublished(capability) | Self::CapabilityNotFound(capability) => {
                Some(capability)
            }
            Self::UnpublishedCapability { .. } | Self::DuplicateComponent(_) => None,
        }
    }
}

pub type ComponentResult<T> = Result<T, ComponentError>;

/// Erros de componente (função de trabalho ou parsing de parâmetros)
#[derive(Debug, Error)]
pub enum ComponentError {
    /// Erro do protocolo de capacidades
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Parâmetro com valor inválido
    #[error("Invalid parameter '{key}': {message}")]
    Parameter { key: String, message: String },

    /// Parâmetro obrigatório ausente
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Erro de IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pânico capturado na função de trabalho
    #[error("Component panicked: {0}")]
    Panic(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ComponentError {
    /// Código de saída reportado ao scheduler
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Capability(err) => err.exit_code(),
            Self::Panic(_) => EXIT_PANIC,
            _ => EXIT_COMPONENT_ERROR,
        }
    }

    /// Erro de capacidade subjacente, se houver
    pub fn as_capability_error(&self) -> Option<&CapabilityError> {
        match self {
            Self::Capability(err) => Some(err),
            _ => None,
        }
    }
}
