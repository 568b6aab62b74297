//! Configuração de execução
//!
//! Dois formatos descrevem o mesmo [`RunConfig`]:
//!
//! - **TOML** (`.toml`): `[scheduler]`, `[cluster]` e uma tabela
//!   `[[component]]` por instância de componente.
//! - **INI** (qualquer outra extensão): uma seção `[Kind]` por componente,
//!   linhas `key = value` e comentários `#`. `[global]` é o
//!   `GlobalParamsComponent`. As chaves `name` e `rank` são reservadas.
//!
//! ```toml
//! [scheduler]
//! fetch_timeout_ms = 60000
//!
//! [[component]]
//! kind = "GlobalParamsComponent"
//! [component.params]
//! inputdir = "./input-data"
//!
//! [[component]]
//! kind = "ExecComponent"
//! name = "gcam"
//! [component.params]
//! command = "./run-gcam.sh"
//! capability = "gcam-core"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use serde::{Deserialize, Serialize};
use cassandra_core::ParamBundle;

use crate::capability::Rank;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::scheduler::SchedulerConfig;

/// Tipo registrado para a seção INI `[global]`
pub const GLOBAL_KIND: &str = "GlobalParamsComponent";

// ═══════════════════════════════════════════════════════════════════════════════
// TIPOS
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuração completa de uma execução
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Opções do escalonador
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Layout multi-rank (ausente = processo único)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterConfig>,

    /// Instâncias de componentes, em ordem de registro
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentSpec>,
}

/// Uma instância de componente
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Chave na fábrica
    pub kind: String,

    /// Nome da instância (padrão: o tipo)
    #[serde(default)]
    pub name: String,

    /// Rank que executa este componente
    #[serde(default)]
    pub rank: Rank,

    /// Parâmetros opacos entregues ao componente
    #[serde(default)]
    pub params: ParamBundle,
}

impl ComponentSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            name: kind.clone(),
            kind,
            rank: 0,
            params: ParamBundle::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key, value);
        self
    }
}

/// Endereços de todos os ranks, indexados pelo rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Endereço de escuta de cada rank (`host:port`)
    pub ranks: Vec<String>,

    /// Por quanto tempo insistir na conexão com um par
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Pausa entre tentativas de conexão
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_connect_retry_ms() -> u64 {
    100
}

impl ClusterConfig {
    pub fn new(ranks: Vec<String>) -> Self {
        Self {
            ranks,
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_retry_ms: default_connect_retry_ms(),
        }
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOML
// ═══════════════════════════════════════════════════════════════════════════════

/// Visão TOML de um componente: parâmetros podem ser escalares ou arrays
#[derive(Deserialize)]
struct RawComponent {
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rank: Rank,
    #[serde(default)]
    params: BTreeMap<String, toml::Value>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    cluster: Option<ClusterConfig>,
    #[serde(default)]
    component: Vec<RawComponent>,
}

fn param_to_string(key: &str, value: toml::Value) -> OrchestrationResult<String> {
    match value {
        toml::Value::String(s) => Ok(s),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(items) => {
            let parts = items
                .into_iter()
                .map(|item| param_to_string(key, item))
                .collect::<OrchestrationResult<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        toml::Value::Table(_) => Err(OrchestrationError::InvalidConfiguration(format!(
            "parameter '{key}' must be a scalar or an array"
        ))),
    }
}

impl RunConfig {
    /// Lê uma configuração TOML
    pub fn from_toml_str(content: &str) -> OrchestrationResult<Self> {
        let raw: RawConfig = toml::from_str(content)?;

        let mut components = Vec::with_capacity(raw.component.len());
        for rc in raw.component {
            let mut params = ParamBundle::new();
            for (key, value) in rc.params {
                let value = param_to_string(&key, value)?;
                params.insert(key, value);
            }
            components.push(ComponentSpec {
                name: rc.name.unwrap_or_else(|| rc.kind.clone()),
                kind: rc.kind,
                rank: rc.rank,
                params,
            });
        }

        let config = Self {
            scheduler: raw.scheduler,
            cluster: raw.cluster,
            components,
        };
        config.validate()?;
        Ok(config)
    }

    /// Lê o formato `[Seção]` / `key = value`
    pub fn from_ini_str(content: &str) -> OrchestrationResult<Self> {
        let mut components: Vec<ComponentSpec> = Vec::new();

        for (lineno, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let section = rest
                    .split_once(']')
                    .map(|(name, _)| name.trim())
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| malformed(lineno, raw_line))?;

                let spec = if section.eq_ignore_ascii_case("global") {
                    ComponentSpec::new(GLOBAL_KIND)
                } else {
                    ComponentSpec::new(section)
                };
                components.push(spec);
                continue;
            }

            let current = components.last_mut().ok_or_else(|| {
                OrchestrationError::InvalidConfiguration(
                    "configuration does not open with a section header".to_string(),
                )
            })?;

            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| malformed(lineno, raw_line))?;

            match key {
                "name" => current.name = value.to_string(),
                "rank" => {
                    current.rank = value.parse().map_err(|_| {
                        OrchestrationError::InvalidConfiguration(format!(
                            "line {}: rank must be a non-negative integer, got '{value}'",
                            lineno + 1
                        ))
                    })?;
                }
                _ => current.params.insert(key, value),
            }
        }

        let config = Self {
            components,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Carrega pela extensão: `.toml` é TOML, o resto é INI
    pub fn load(path: &Path) -> OrchestrationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::InvalidConfiguration(format!("failed to read {}: {e}", path.display()))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_ini_str(&content)
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_component(mut self, spec: ComponentSpec) -> Self {
        self.components.push(spec);
        self
    }

    /// Número de ranks participantes
    pub fn rank_count(&self) -> usize {
        self.cluster.as_ref().map_or(1, |c| c.ranks.len().max(1))
    }

    /// Componentes do `rank`, com seu índice global de registro
    pub fn components_for_rank(&self, rank: Rank) -> impl Iterator<Item = (usize, &ComponentSpec)> {
        self.components
            .iter()
            .enumerate()
            .filter(move |(_, spec)| spec.rank == rank)
    }

    /// Nomes únicos, tipos não vazios e ranks dentro do cluster
    pub fn validate(&self) -> OrchestrationResult<()> {
        let ranks = self.rank_count();
        let mut seen = HashSet::new();

        for spec in &self.components {
            if spec.kind.is_empty() {
                return Err(OrchestrationError::InvalidConfiguration(
                    "component with empty kind".to_string(),
                ));
            }
            if spec.name.is_empty() {
                return Err(OrchestrationError::InvalidConfiguration(format!(
                    "component of kind '{}' has an empty name",
                    spec.kind
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(OrchestrationError::ComponentAlreadyRegistered(spec.name.clone()));
            }
            if spec.rank >= ranks {
                return Err(OrchestrationError::InvalidConfiguration(format!(
                    "component '{}' placed on rank {} but the run has {ranks} rank(s)",
                    spec.name, spec.rank
                )));
            }
        }
        Ok(())
    }
}

fn malformed(lineno: usize, line: &str) -> OrchestrationError {
    OrchestrationError::InvalidConfiguration(format!("line {}: malformed line: {line}", lineno + 1))
}
