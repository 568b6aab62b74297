//! # 🎯 Traits — Abstrações Fundamentais do Kernel
//!
//! | Trait | Quem implementa | Papel |
//! |:------|:----------------|:------|
//! | [`Component`] | Modelos (usuário) | `initialize`, `finalize_parsing`, `run` |
//! | [`CapabilityContext`] | Kernel (`KernelHandle`) | `register`, `publish`, `fetch` |
//!
//! O componente é o estado mutável do usuário; o contexto é o handle do
//! kernel, imutável depois de construído. Os dois nunca se misturam.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{CapabilityError, ComponentResult};
use crate::params::{CommonParams, ParamBundle};

// ═══════════════════════════════════════════════════════════════════════════════
// TIPOS COMUNS
// ═══════════════════════════════════════════════════════════════════════════════

/// Valor de uma capacidade (opaco para o kernel, serializável entre ranks)
pub type CapabilityValue = serde_json::Value;

/// Valor publicado, compartilhado por todos os consumidores
pub type SharedValue = Arc<CapabilityValue>;

/// Status de sucesso da função de trabalho
pub const EXIT_SUCCESS: i32 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXTO DO KERNEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Acesso de um componente à tabela de capacidades.
///
/// - `register`: só durante `initialize` / `finalize_parsing`
/// - `publish`: só durante `run`, uma vez por capacidade declarada
/// - `fetch`: bloqueia até a capacidade ser publicada ou o dono falhar
pub trait CapabilityContext: Send + Sync {
    /// Nome da instância do componente
    fn component(&self) -> &str;

    /// Tipo do componente (chave na factory)
    fn kind(&self) -> &str;

    /// Parâmetros comuns já processados pelo framework
    fn common(&self) -> &CommonParams;

    /// Declara uma capacidade que este componente vai produzir
    fn register(&self, capability: &str) -> Result<(), CapabilityError>;

    /// Sela o valor de uma capacidade própria e acorda os consumidores
    fn publish(&self, capability: &str, value: CapabilityValue) -> Result<(), CapabilityError>;

    /// Obtém o valor de uma capacidade de outro componente
    fn fetch(&self, capability: &str) -> Result<SharedValue, CapabilityError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTE
// ═══════════════════════════════════════════════════════════════════════════════

/// Unidade de trabalho executada uma única vez por execução.
///
/// O wrapper chama, nesta ordem: [`initialize`](Component::initialize),
/// [`finalize_parsing`](Component::finalize_parsing) e, depois da barreira
/// de registro, [`run`](Component::run) em uma thread própria.
///
/// # Exemplo
///
/// ```
/// use cassandra_core::prelude::*;
///
/// #[derive(Debug)]
/// struct Sink;
///
/// impl Component for Sink {
///     fn kind(&self) -> &str { "Sink" }
///
///     fn initialize(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<()> {
///         Ok(())
///     }
///
///     fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
///         let temp = ctx.fetch("temp")?;
///         Ok(if temp.is_number() { EXIT_SUCCESS } else { 1 })
///     }
/// }
/// ```
pub trait Component: Send + Debug {
    /// Tipo do componente (para logs e relatório)
    fn kind(&self) -> &str;

    /// Declara as capacidades do componente
    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()>;

    /// Processa os parâmetros específicos do componente
    fn finalize_parsing(
        &mut self,
        _ctx: &dyn CapabilityContext,
        _params: &ParamBundle,
    ) -> ComponentResult<()> {
        Ok(())
    }

    /// Função de trabalho: 0 = sucesso, qualquer outro valor = código de falha
    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32>;
}
