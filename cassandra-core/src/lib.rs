//! # 🧩 Cassandra-Core
//!
//! Abstrações do kernel de coordenação de modelos acoplados.
//!
//! > *"Trait no core, implementação no módulo."*
//!
//! ## O Padrão de Acoplamento
//!
//! 1. Todo modelo é um **componente** com ciclo de vida fixo
//! 2. Todo componente declara as **capacidades** que vai produzir
//! 3. Capacidades são **publicadas uma única vez** e nunca mudam
//! 4. Consumidores **bloqueiam** até a capacidade ficar pronta (ou o dono falhar)
//!
//! ## Módulos
//!
//! - [`state`]: ComponentState — máquina de estados do componente
//! - [`traits`]: Component e CapabilityContext
//! - [`params`]: ParamBundle e parâmetros comuns (`clobber`)
//! - [`error`]: CapabilityError e ComponentError
//!
//! A implementação concreta (tabela de capacidades, wrapper, scheduler,
//! distribuição) vive em `cassandra-orchestration`.
//!
//! ## Quick Start
//!
//! ```
//! use cassandra_core::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Temperature;
//!
//! impl Component for Temperature {
//!     fn kind(&self) -> &str { "Temperature" }
//!
//!     fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
//!         ctx.register("temp")?;
//!         Ok(())
//!     }
//!
//!     fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
//!         ctx.publish("temp", serde_json::json!(42))?;
//!         Ok(EXIT_SUCCESS)
//!     }
//! }
//! ```

pub mod error;
pub mod params;
pub mod state;
pub mod traits;
pub mod prelude;

pub use error::{CapabilityError, ComponentError, ComponentResult};
pub use params::{CommonParams, ParamBundle, parse_flag};
pub use state::ComponentState;
pub use traits::{
    CapabilityContext, CapabilityValue, Component, EXIT_SUCCESS, SharedValue,
};
