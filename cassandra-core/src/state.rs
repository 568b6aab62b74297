//! Estados do ciclo de vida de um componente
//!
//! ```text
//! CREATED ──► PARSED ──► RUNNING ──► FINISHED
//!    │          │           │
//!    └──────────┴───────────┴──────► FAILED
//! ```
//!
//! As transições são monotônicas: nenhum estado é revisitado.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Estado de um componente durante uma execução
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentState {
    /// Construído, nenhuma capacidade exposta
    #[default]
    Created,
    /// `initialize` + `finalize_parsing` concluídos (janela de registro)
    Parsed,
    /// Função de trabalho em execução
    Running,
    /// Função de trabalho retornou 0 e todas as capacidades foram publicadas
    Finished,
    /// Status não-zero, erro irrecuperável ou capacidade não publicada
    Failed,
}

impl ComponentState {
    /// Estado terminal (FINISHED ou FAILED)?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Ordem na máquina de estados (FAILED é o último)
    fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Parsed => 1,
            Self::Running => 2,
            Self::Finished => 3,
            Self::Failed => 4,
        }
    }

    /// Verifica se a transição `self → next` é válida
    pub fn can_transition_to(self, next: ComponentState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Finished => self == Self::Running,
            _ => next.rank() == self.rank() + 1,
        }
    }

    /// Nome canônico (maiúsculo)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Parsed => "PARSED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
