//! Mensagens de coordenação entre ranks
//!
//! Cada mensagem viaja dentro de um [`Envelope`] serializado como uma
//! linha JSON.

use serde::{Deserialize, Serialize};
use cassandra_core::CapabilityValue;

use crate::capability::Rank;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::scheduler::ComponentReport;

/// Capacidade declarada por um componente local de um rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub capability: String,
    pub owner: String,
}

/// Resposta a um pedido de fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Published { value: CapabilityValue },
    Failed { reason: String },
}

impl From<FetchOutcome> for Result<CapabilityValue, String> {
    fn from(outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Published { value } => Ok(value),
            FetchOutcome::Failed { reason } => Err(reason),
        }
    }
}

/// Protocolo entre ranks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationMessage {
    /// Primeira linha de toda conexão
    Hello,
    /// Registros locais do remetente (barreira de registro)
    Announce { capabilities: Vec<Registration> },
    /// Pede o valor de uma capacidade do destinatário
    FetchRequest { capability: String },
    /// Valor (ou falha) de uma capacidade pedida
    FetchReply { capability: String, outcome: FetchOutcome },
    /// Relatórios dos componentes locais do remetente
    Done { reports: Vec<ComponentReport> },
}

impl CoordinationMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Announce { .. } => "announce",
            Self::FetchRequest { .. } => "fetch_request",
            Self::FetchReply { .. } => "fetch_reply",
            Self::Done { .. } => "done",
        }
    }
}

/// Mensagem com o rank de origem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Rank,
    pub message: CoordinationMessage,
}

impl Envelope {
    pub fn new(from: Rank, message: CoordinationMessage) -> Self {
        Self { from, message }
    }

    /// Uma linha JSON terminada em `\n`
    pub fn encode(&self) -> OrchestrationResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> OrchestrationResult<Self> {
        serde_json::from_str(line.trim_end()).map_err(|e| {
            OrchestrationError::Serialization(format!("bad coordination message: {e}"))
        })
    }
}
