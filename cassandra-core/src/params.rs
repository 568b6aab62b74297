//! Parâmetros de componente
//!
//! O kernel trata o [`ParamBundle`] como opaco: só o pré-passo do framework
//! interpreta os parâmetros comuns a todos os componentes ([`CommonParams`]).

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::error::{ComponentError, ComponentResult};

/// Pares chave/valor vindos da configuração da execução
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamBundle(BTreeMap<String, String>);

impl ParamBundle {
    /// Cria bundle vazio
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona (ou substitui) um parâmetro
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder: adiciona parâmetro
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Retorna o parâmetro ou `MissingParameter`
    pub fn require(&self, key: &str) -> ComponentResult<&str> {
        self.get(key)
            .ok_or_else(|| ComponentError::MissingParameter(key.to_string()))
    }

    /// Interpreta um parâmetro booleano (True/False)
    pub fn flag(&self, key: &str) -> ComponentResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_flag(raw).map(Some).ok_or_else(|| ComponentError::Parameter {
                key: key.to_string(),
                message: format!("expected True or False, got '{raw}'"),
            }),
        }
    }

    /// Lista separada por vírgulas (entradas vazias ignoradas)
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove e retorna um parâmetro
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Objeto JSON com todos os parâmetros
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParamBundle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Interpreta strings True/False (case-insensitive; aceita também 1/0, yes/no)
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Parâmetros comuns a todos os componentes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParams {
    /// Sobrescrever saídas existentes (padrão: true)
    pub clobber: bool,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self { clobber: true }
    }
}

impl CommonParams {
    /// Extrai os parâmetros comuns de um bundle
    pub fn from_params(params: &ParamBundle) -> ComponentResult<Self> {
        let mut common = Self::default();
        if let Some(clobber) = params.flag("clobber")? {
            common.clobber = clobber;
        }
        Ok(common)
    }
}
