//! # Prelude — Re-exportações Convenientes
//!
//! ```
//! use cassandra_core::prelude::*;
//! ```

// Ciclo de vida
pub use crate::state::ComponentState;

// Traits fundamentais
pub use crate::traits::{
    CapabilityContext,
    CapabilityValue,
    Component,
    EXIT_SUCCESS,
    SharedValue,
};

// Parâmetros
pub use crate::params::{CommonParams, ParamBundle};

// Erros
pub use crate::error::{CapabilityError, ComponentError, ComponentResult};
