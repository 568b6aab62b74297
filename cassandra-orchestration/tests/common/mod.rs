//! Componentes de teste compartilhados pelos testes de integração

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use cassandra_orchestration::*;
use serde_json::{json, Value};

/// Publica valores fixos depois de um atraso
#[derive(Debug, Clone)]
pub struct Producer {
    pub outputs: Vec<(String, Value)>,
    pub delay: Duration,
    pub status: i32,
    pub publish: bool,
}

impl Producer {
    pub fn new(capability: &str, value: Value) -> Self {
        Self {
            outputs: vec![(capability.to_string(), value)],
            delay: Duration::ZERO,
            status: 0,
            publish: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Registra mas não publica, e sai com `status`
    pub fn failing(mut self, status: i32) -> Self {
        self.status = status;
        self.publish = false;
        self
    }

    pub fn silent(mut self) -> Self {
        self.publish = false;
        self
    }
}

impl Component for Producer {
    fn kind(&self) -> &str {
        "Producer"
    }

    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        for (capability, _) in &self.outputs {
            ctx.register(capability)?;
        }
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        thread::sleep(self.delay);
        if self.publish {
            for (capability, value) in &self.outputs {
                ctx.publish(capability, value.clone())?;
            }
        }
        Ok(self.status)
    }
}

/// Busca capacidades e guarda o que recebeu
#[derive(Debug, Clone, Default)]
pub struct Consumer {
    pub requires: Vec<String>,
    pub seen: Arc<Mutex<Vec<SharedValue>>>,
    pub expect: Option<Value>,
    pub fetch_twice: bool,
}

impl Consumer {
    pub fn new(requires: &[&str]) -> Self {
        Self {
            requires: requires.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn expecting(mut self, value: Value) -> Self {
        self.expect = Some(value);
        self
    }

    pub fn seen(&self) -> Vec<SharedValue> {
        self.seen.lock().unwrap().clone()
    }
}

impl Component for Consumer {
    fn kind(&self) -> &str {
        "Consumer"
    }

    fn initialize(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        for capability in &self.requires {
            let value = ctx.fetch(capability)?;
            if self.fetch_twice {
                let again = ctx.fetch(capability)?;
                self.seen.lock().unwrap().push(again);
            }
            if let Some(expected) = &self.expect {
                if *value != *expected {
                    return Ok(1);
                }
            }
            self.seen.lock().unwrap().push(value);
        }
        Ok(0)
    }
}

/// Busca `input` e publica `output` com o mesmo valor
#[derive(Debug, Clone)]
pub struct Relay {
    pub input: String,
    pub output: String,
}

impl Relay {
    pub fn new(input: &str, output: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
        }
    }
}

impl Component for Relay {
    fn kind(&self) -> &str {
        "Relay"
    }

    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        ctx.register(&self.output)?;
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        let value = ctx.fetch(&self.input)?;
        ctx.publish(&self.output, (*value).clone())?;
        Ok(0)
    }
}

/// Violações do protocolo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misuse {
    SelfFetch,
    FetchUnknown,
    PublishTwice,
    RegisterLate,
    Panic,
}

#[derive(Debug, Clone)]
pub struct Misbehaving(pub Misuse);

impl Component for Misbehaving {
    fn kind(&self) -> &str {
        "Misbehaving"
    }

    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        ctx.register("own")?;
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        match self.0 {
            Misuse::SelfFetch => {
                ctx.fetch("own")?;
            }
            Misuse::FetchUnknown => {
                ctx.fetch("does-not-exist")?;
            }
            Misuse::PublishTwice => {
                ctx.publish("own", json!(1))?;
                ctx.publish("own", json!(2))?;
            }
            Misuse::RegisterLate => {
                ctx.register("late")?;
            }
            Misuse::Panic => panic!("component exploded"),
        }
        ctx.publish("own", json!(0))?;
        Ok(0)
    }
}

/// Busca durante `initialize`, antes de qualquer componente rodar
#[derive(Debug, Clone)]
pub struct EagerConsumer(pub String);

impl Component for EagerConsumer {
    fn kind(&self) -> &str {
        "EagerConsumer"
    }

    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        ctx.fetch(&self.0)?;
        Ok(())
    }

    fn run(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        Ok(0)
    }
}

pub fn slot(name: &str, component: impl Component + 'static) -> ComponentSlot {
    ComponentSlot::new(name, Box::new(component))
}

/// Factory com os componentes de teste configuráveis por parâmetros
pub fn test_factory() -> ComponentFactory {
    ComponentFactory::with_builtins()
        .with("Producer", || Box::new(ParamProducer::default()))
        .with("Consumer", || Box::new(ParamConsumer::default()))
}

/// Produtor guiado por parâmetros: `capability`, `value`, `status`, `delay_ms`
#[derive(Debug, Default)]
pub struct ParamProducer {
    capability: String,
    value: String,
    status: i32,
    delay: Duration,
}

impl Component for ParamProducer {
    fn kind(&self) -> &str {
        "Producer"
    }

    fn initialize(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        Ok(())
    }

    fn finalize_parsing(&mut self, ctx: &dyn CapabilityContext, params: &ParamBundle) -> ComponentResult<()> {
        self.capability = params.require("capability")?.to_string();
        self.value = params.get_or("value", "").to_string();
        self.status = params.get_or("status", "0").parse().map_err(|_| ComponentError::Parameter {
            key: "status".into(),
            message: "not an integer".into(),
        })?;
        self.delay = Duration::from_millis(params.get_or("delay_ms", "0").parse().unwrap_or(0));
        ctx.register(&self.capability)?;
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        thread::sleep(self.delay);
        if self.status != 0 {
            return Ok(self.status);
        }
        ctx.publish(&self.capability, json!(self.value))?;
        Ok(0)
    }
}

/// Consumidor guiado por parâmetros: `requires`, `expect`
#[derive(Debug, Default)]
pub struct ParamConsumer {
    requires: Vec<String>,
    expect: Option<String>,
}

impl Component for ParamConsumer {
    fn kind(&self) -> &str {
        "Consumer"
    }

    fn initialize(&mut self, _ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        Ok(())
    }

    fn finalize_parsing(&mut self, _ctx: &dyn CapabilityContext, params: &ParamBundle) -> ComponentResult<()> {
        self.requires = params.list("requires");
        self.expect = params.get("expect").map(String::from);
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        for capability in &self.requires {
            let value = ctx.fetch(capability)?;
            if let Some(expected) = &self.expect {
                if value.as_str() != Some(expected.as_str()) {
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }
}
