//! # Componentes genéricos
//!
//! | Tipo | Capacidade | Papel |
//! |:-----|:-----------|:------|
//! | [`GlobalParamsComponent`] | `general` | Parâmetros globais da execução |
//! | [`ExecComponent`] | configurável | Roda um comando externo como modelo |

use std::path::{Path, PathBuf};
use std::process::Command;
use serde_json::{json, Map, Value};
use cassandra_core::{
    CapabilityContext, Component, ComponentError, ComponentResult, ParamBundle, EXIT_SUCCESS,
};

use crate::config::GLOBAL_KIND;

/// Resolve `path` contra `base` se não for absoluto
fn absolute(path: &str, base: &Path) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GLOBAL PARAMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Publica os parâmetros da seção `[global]` na capacidade `general`.
///
/// - `ModelInterface`, `DBXMLlib`: quando presentes, relativos ao diretório atual
/// - `inputdir` (padrão `./input-data`): sempre relativo ao diretório atual
/// - `rgnconfig` (padrão `rgn14`): relativo a `inputdir`, exceto quando
///   começa com `/` ou `./`
#[derive(Debug, Default)]
pub struct GlobalParamsComponent {
    params: ParamBundle,
}

impl GlobalParamsComponent {
    pub const CAPABILITY: &'static str = "general";
    pub const DEFAULT_INPUTDIR: &'static str = "./input-data";
    pub const DEFAULT_RGNCONFIG: &'static str = "rgn14";
    /// Caminhos de ferramentas externas, resolvidos contra o diretório atual
    pub const TOOL_PATHS: [&'static str; 2] = ["ModelInterface", "DBXMLlib"];

    pub fn new() -> Self {
        Self::default()
    }

    /// Parâmetros com caminhos resolvidos contra `cwd`
    pub fn resolve(&self, cwd: &Path) -> Value {
        let mut resolved = match self.params.to_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for key in Self::TOOL_PATHS {
            if let Some(path) = self.params.get(key) {
                resolved.insert(key.into(), json!(absolute(path, cwd).to_string_lossy()));
            }
        }

        let inputdir = absolute(self.params.get_or("inputdir", Self::DEFAULT_INPUTDIR), cwd);

        let rgnconfig = match self.params.get("rgnconfig") {
            Some(rgn) if rgn.starts_with("./") => absolute(rgn, cwd),
            Some(rgn) => absolute(rgn, &inputdir),
            None => {
                tracing::info!("using default region mapping ({})", Self::DEFAULT_RGNCONFIG);
                inputdir.join(Self::DEFAULT_RGNCONFIG)
            }
        };

        resolved.insert("inputdir".into(), json!(inputdir.to_string_lossy()));
        resolved.insert("rgnconfig".into(), json!(rgnconfig.to_string_lossy()));
        Value::Object(resolved)
    }
}

impl Component for GlobalParamsComponent {
    fn kind(&self) -> &str {
        GLOBAL_KIND
    }

    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        ctx.register(Self::CAPABILITY)?;
        Ok(())
    }

    fn finalize_parsing(
        &mut self,
        _ctx: &dyn CapabilityContext,
        params: &ParamBundle,
    ) -> ComponentResult<()> {
        self.params = params.clone();
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        let cwd = std::env::current_dir()?;
        ctx.publish(Self::CAPABILITY, self.resolve(&cwd))?;
        Ok(EXIT_SUCCESS)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXEC
// ═══════════════════════════════════════════════════════════════════════════════

/// Roda um comando externo e publica o resultado.
///
/// Parâmetros:
/// - `command` (obrigatório), `args` (lista separada por vírgulas)
/// - `capability`: capacidade publicada (ausente = consumidor puro)
/// - `requires`: capacidades buscadas antes de rodar; cada valor vai para o
///   ambiente do processo como `CASSANDRA_<NOME>` (JSON)
/// - `outputs`: arquivos produzidos; com `clobber = false` e todos
///   existentes, o comando não roda
/// - `workdir`: diretório de trabalho do processo
#[derive(Debug, Default)]
pub struct ExecComponent {
    command: String,
    args: Vec<String>,
    capability: Option<String>,
    requires: Vec<String>,
    outputs: Vec<PathBuf>,
    workdir: Option<PathBuf>,
}

impl ExecComponent {
    pub const KIND: &'static str = "ExecComponent";

    pub fn new() -> Self {
        Self::default()
    }

    /// Nome da variável de ambiente para uma capacidade
    pub fn env_var(capability: &str) -> String {
        let suffix: String = capability
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("CASSANDRA_{suffix}")
    }

    fn publish(&self, ctx: &dyn CapabilityContext, value: Value) -> ComponentResult<()> {
        if let Some(capability) = &self.capability {
            ctx.publish(capability, value)?;
        }
        Ok(())
    }
}

impl Component for ExecComponent {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn initialize(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        Ok(())
    }

    fn finalize_parsing(
        &mut self,
        ctx: &dyn CapabilityContext,
        params: &ParamBundle,
    ) -> ComponentResult<()> {
        self.command = params.require("command")?.to_string();
        self.args = params.list("args");
        self.requires = params.list("requires");
        self.outputs = params.list("outputs").into_iter().map(PathBuf::from).collect();
        self.workdir = params.get("workdir").map(PathBuf::from);
        self.capability = params.get("capability").map(String::from);

        if let Some(capability) = &self.capability {
            ctx.register(capability)?;
        }
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        let mut inputs = Vec::with_capacity(self.requires.len());
        for capability in &self.requires {
            let value = ctx.fetch(capability)?;
            inputs.push((Self::env_var(capability), value.to_string()));
        }

        let outputs: Vec<Value> = self
            .outputs
            .iter()
            .map(|p| json!(p.to_string_lossy()))
            .collect();

        if !ctx.common().clobber
            && !self.outputs.is_empty()
            && self.outputs.iter().all(|p| p.exists())
        {
            tracing::info!(component = ctx.component(), "results exist and no clobber, skipping");
            self.publish(ctx, json!({ "status": 0, "skipped": true, "outputs": outputs }))?;
            return Ok(EXIT_SUCCESS);
        }

        let mut command = Command::new(&self.command);
        command.args(&self.args).envs(inputs);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        tracing::debug!(component = ctx.component(), command = %self.command, "spawning");
        let output = command.output()?;

        let Some(status) = output.status.code() else {
            return Err(ComponentError::Other(format!(
                "'{}' terminated by signal",
                self.command
            )));
        };

        if status != EXIT_SUCCESS {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(component = ctx.component(), status, stderr = %stderr.trim(), "command failed");
            return Ok(status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        self.publish(
            ctx,
            json!({ "status": status, "skipped": false, "stdout": stdout, "outputs": outputs }),
        )?;
        Ok(EXIT_SUCCESS)
    }
}
