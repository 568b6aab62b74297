//! # Tabela de Capacidades
//!
//! Registro compartilhado `nome → entrada`, único ponto de contenção entre
//! componentes. Cada entrada tem seu próprio mutex + condvar: capacidades
//! não relacionadas nunca disputam o mesmo lock.
//!
//! ```text
//!            register (PARSED)           publish (RUNNING, uma vez)
//!  owner ───────────────────► Entry ◄──────────────────────── owner
//!                              │  ready: Mutex<bool> + Condvar
//!                              │  sealed: OnceLock<Resolution>
//!                              ▼
//!              fetch ──► espera até Published | Failed
//! ```
//!
//! Depois de selada, a entrada é lida sem lock (`OnceLock`): fetches
//! repetidos não contendem no condvar.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use crossbeam_utils::sync::ShardedLock;
use serde::{Deserialize, Serialize};
use cassandra_core::{CapabilityError, CapabilityValue, SharedValue};

use crate::events::{EventBus, LifecycleEvent};

/// Índice de um processo participante (rank)
pub type Rank = usize;

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRADA
// ═══════════════════════════════════════════════════════════════════════════════

/// Onde vive o dono da capacidade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryOrigin {
    /// Dono neste processo
    Local,
    /// Dono em outro rank; o valor chega pela camada de distribuição
    Remote { rank: Rank },
}

/// Valor selado de uma entrada
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Publicado pelo dono
    Published(SharedValue),
    /// Dono chegou a FAILED sem publicar
    Failed { reason: String },
}

/// Situação de uma entrada (para relatórios)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Published,
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Pending => f.write_str("pending"),
            EntryStatus::Published => f.write_str("published"),
            EntryStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Pede a outro rank o valor de uma capacidade remota
pub trait RemoteResolver: Send + Sync {
    /// Envia o pedido; a resposta chega por [`CapabilityTable::resolve_remote`]
    fn request(&self, capability: &str, rank: Rank) -> Result<(), String>;
}

/// Entrada da tabela: uma capacidade, um dono, um valor escrito uma vez
pub struct CapabilityEntry {
    name: String,
    owner: String,
    origin: EntryOrigin,
    /// Ordem de registro
    index: usize,
    /// Flag de prontidão; o condvar espera neste mutex
    ready: Mutex<bool>,
    signal: Condvar,
    /// Resultado selado (leitura lock-free depois de pronto)
    sealed: OnceLock<Resolution>,
    /// Pedido remoto já enviado?
    requested: AtomicBool,
}

impl CapabilityEntry {
    fn new(name: &str, owner: &str, origin: EntryOrigin, index: usize) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            origin,
            index,
            ready: Mutex::new(false),
            signal: Condvar::new(),
            sealed: OnceLock::new(),
            requested: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn origin(&self) -> EntryOrigin {
        self.origin
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Situação atual (sem bloquear)
    pub fn status(&self) -> EntryStatus {
        match self.sealed.get() {
            None => EntryStatus::Pending,
            Some(Resolution::Published(_)) => EntryStatus::Published,
            Some(Resolution::Failed { .. }) => EntryStatus::Failed,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    /// Sela a entrada e acorda todos os consumidores.
    ///
    /// Retorna `false` se já estava selada (nada muda).
    fn seal(&self, resolution: Resolution) -> bool {
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        if *ready {
            return false;
        }
        if self.sealed.set(resolution).is_err() {
            return false;
        }
        *ready = true;
        self.signal.notify_all();
        true
    }

    fn outcome(&self, resolution: &Resolution) -> Result<SharedValue, CapabilityError> {
        match resolution {
            Resolution::Published(value) => Ok(Arc::clone(value)),
            Resolution::Failed { reason } => Err(CapabilityError::DependencyFailed {
                capability: self.name.clone(),
                owner: self.owner.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Bloqueia até a entrada ser selada (ou o timeout expirar)
    fn wait(&self, timeout: Option<Duration>) -> Result<SharedValue, CapabilityError> {
        // Caminho rápido: já selada, sem lock
        if let Some(resolution) = self.sealed.get() {
            return self.outcome(resolution);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);

        // Loop: acordar sem o flag (spurious wakeup) volta a esperar
        while !*ready {
            tracing::trace!(capability = %self.name, "fetch waiting");
            ready = match deadline {
                None => self.signal.wait(ready).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CapabilityError::FetchTimeout {
                            capability: self.name.clone(),
                            timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
                        });
                    }
                    self.signal
                        .wait_timeout(ready, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        drop(ready);

        match self.sealed.get() {
            Some(resolution) => self.outcome(resolution),
            // ready == true implica sealed preenchido (ambos sob o mesmo lock)
            None => Err(CapabilityError::CapabilityNotFound(self.name.clone())),
        }
    }
}

impl fmt::Debug for CapabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityEntry")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("origin", &self.origin)
            .field("index", &self.index)
            .field("status", &self.status())
            .finish()
    }
}

/// Linha do snapshot da tabela
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub owner: String,
    pub origin: EntryOrigin,
    pub status: EntryStatus,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TABELA
// ═══════════════════════════════════════════════════════════════════════════════

/// Tabela de capacidades de uma execução
pub struct CapabilityTable {
    /// Entradas por nome (escrita só durante o registro)
    entries: ShardedLock<HashMap<String, Arc<CapabilityEntry>>>,
    /// Janela de registro aberta?
    registration_open: AtomicBool,
    next_index: AtomicUsize,
    /// Bus de eventos (opcional)
    events: Option<Arc<EventBus>>,
    /// Resolvedor de entradas remotas (instalado pela distribuição)
    resolver: OnceLock<Arc<dyn RemoteResolver>>,
}

impl CapabilityTable {
    /// Cria tabela vazia com a janela de registro aberta
    pub fn new() -> Self {
        Self {
            entries: ShardedLock::new(HashMap::new()),
            registration_open: AtomicBool::new(true),
            next_index: AtomicUsize::new(0),
            events: None,
            resolver: OnceLock::new(),
        }
    }

    /// Cria tabela que emite eventos de ciclo de vida
    pub fn with_events(events: Arc<EventBus>) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    /// Instala o resolvedor remoto (uma vez)
    pub fn set_remote_resolver(&self, resolver: Arc<dyn RemoteResolver>) -> bool {
        self.resolver.set(resolver).is_ok()
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn lookup(&self, capability: &str) -> Option<Arc<CapabilityEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(capability)
            .cloned()
    }

    // === Registro ===

    /// Registra `capability` como produzida por `owner`
    pub fn register(&self, capability: &str, owner: &str) -> Result<(), CapabilityError> {
        self.insert(capability, owner, EntryOrigin::Local)
    }

    /// Registra capacidade cujo dono vive em outro rank
    pub fn register_remote(
        &self,
        capability: &str,
        owner: &str,
        rank: Rank,
    ) -> Result<(), CapabilityError> {
        self.insert(capability, owner, EntryOrigin::Remote { rank })
    }

    fn insert(&self, capability: &str, owner: &str, origin: EntryOrigin) -> Result<(), CapabilityError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        // Checado sob o write lock: close_registration também o toma
        if !self.registration_open.load(Ordering::Acquire) {
            return Err(CapabilityError::RegistrationWindowClosed {
                capability: capability.to_string(),
                component: owner.to_string(),
            });
        }

        if let Some(existing) = entries.get(capability) {
            if existing.owner == owner && existing.origin == origin {
                return Ok(());
            }
            return Err(CapabilityError::DuplicateCapability {
                capability: capability.to_string(),
                owner: existing.owner.clone(),
                requested_by: owner.to_string(),
            });
        }

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            capability.to_string(),
            Arc::new(CapabilityEntry::new(capability, owner, origin, index)),
        );
        drop(entries);

        tracing::debug!(capability, owner, ?origin, "capability registered");
        self.emit(LifecycleEvent::CapabilityRegistered {
            capability: capability.to_string(),
            owner: owner.to_string(),
        });
        Ok(())
    }

    /// Fecha a janela de registro (barreira antes da fase de execução)
    pub fn close_registration(&self) {
        let entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let was_open = self.registration_open.swap(false, Ordering::AcqRel);
        let count = entries.len();
        drop(entries);

        if was_open {
            tracing::debug!(capabilities = count, "registration window closed");
            self.emit(LifecycleEvent::RegistrationClosed { capabilities: count });
        }
    }

    pub fn is_registration_open(&self) -> bool {
        self.registration_open.load(Ordering::Acquire)
    }

    // === Publicação ===

    /// Sela o valor de `capability`; só o dono pode, uma única vez
    pub fn publish(
        &self,
        capability: &str,
        caller: &str,
        value: CapabilityValue,
    ) -> Result<(), CapabilityError> {
        let entry = self
            .lookup(capability)
            .ok_or_else(|| CapabilityError::CapabilityNotFound(capability.to_string()))?;

        if entry.owner != caller || entry.origin != EntryOrigin::Local {
            return Err(CapabilityError::NotOwner {
                capability: capability.to_string(),
                owner: entry.owner.clone(),
                caller: caller.to_string(),
            });
        }

        if !entry.seal(Resolution::Published(Arc::new(value))) {
            return Err(CapabilityError::AlreadyPublished(capability.to_string()));
        }

        tracing::debug!(capability, owner = caller, "capability published");
        self.emit(LifecycleEvent::CapabilityPublished {
            capability: capability.to_string(),
            owner: caller.to_string(),
        });
        Ok(())
    }

    // === Consumo ===

    /// Obtém o valor de `capability` para `caller`, bloqueando até estar pronto
    pub fn fetch(
        &self,
        capability: &str,
        caller: &str,
        timeout: Option<Duration>,
    ) -> Result<SharedValue, CapabilityError> {
        let entry = self
            .lookup(capability)
            .ok_or_else(|| CapabilityError::CapabilityNotFound(capability.to_string()))?;

        if entry.owner == caller {
            return Err(CapabilityError::SelfFetch {
                capability: capability.to_string(),
                component: caller.to_string(),
            });
        }

        self.await_entry(&entry, timeout)
    }

    /// Espera uma entrada local em nome de outro rank (sem checagem de dono)
    pub fn fetch_for_peer(
        &self,
        capability: &str,
        timeout: Option<Duration>,
    ) -> Result<SharedValue, CapabilityError> {
        let entry = self
            .lookup(capability)
            .ok_or_else(|| CapabilityError::CapabilityNotFound(capability.to_string()))?;
        self.await_entry(&entry, timeout)
    }

    fn await_entry(
        &self,
        entry: &CapabilityEntry,
        timeout: Option<Duration>,
    ) -> Result<SharedValue, CapabilityError> {
        if let EntryOrigin::Remote { rank } = entry.origin {
            if !entry.is_sealed() && !entry.requested.swap(true, Ordering::AcqRel) {
                self.request_remote(entry, rank);
            }
        }
        entry.wait(timeout)
    }

    fn request_remote(&self, entry: &CapabilityEntry, rank: Rank) {
        let result = match self.resolver.get() {
            Some(resolver) => resolver.request(&entry.name, rank),
            None => Err(format!("no route to rank {rank}")),
        };

        if let Err(reason) = result {
            tracing::warn!(capability = %entry.name, rank, %reason, "remote fetch request failed");
            if entry.seal(Resolution::Failed { reason: reason.clone() }) {
                self.emit(LifecycleEvent::CapabilityFailed {
                    capability: entry.name.clone(),
                    owner: entry.owner.clone(),
                    reason,
                });
            }
        }
    }

    // === Falhas ===

    /// Sela como falhas todas as entradas locais ainda pendentes de `owner`.
    ///
    /// Retorna os nomes afetados, em ordem de registro.
    pub fn fail_owner(&self, owner: &str, reason: &str) -> Vec<String> {
        let pending: Vec<_> = self
            .sorted_entries()
            .into_iter()
            .filter(|e| e.owner == owner && e.origin == EntryOrigin::Local && !e.is_sealed())
            .collect();

        let mut failed = Vec::new();
        for entry in pending {
            if entry.seal(Resolution::Failed { reason: reason.to_string() }) {
                tracing::warn!(capability = %entry.name, owner, reason, "capability failed");
                self.emit(LifecycleEvent::CapabilityFailed {
                    capability: entry.name.clone(),
                    owner: owner.to_string(),
                    reason: reason.to_string(),
                });
                failed.push(entry.name.clone());
            }
        }
        failed
    }

    /// Sela como falhas as entradas remotas pendentes de um rank perdido
    pub fn fail_rank(&self, rank: Rank, reason: &str) -> Vec<String> {
        let mut failed = Vec::new();
        for entry in self.sorted_entries() {
            if entry.origin == (EntryOrigin::Remote { rank })
                && entry.seal(Resolution::Failed { reason: reason.to_string() })
            {
                self.emit(LifecycleEvent::CapabilityFailed {
                    capability: entry.name.clone(),
                    owner: entry.owner.clone(),
                    reason: reason.to_string(),
                });
                failed.push(entry.name.clone());
            }
        }
        failed
    }

    /// Resolve uma entrada remota com a resposta do rank dono
    pub fn resolve_remote(
        &self,
        capability: &str,
        outcome: Result<CapabilityValue, String>,
    ) -> Result<(), CapabilityError> {
        let entry = self
            .lookup(capability)
            .ok_or_else(|| CapabilityError::CapabilityNotFound(capability.to_string()))?;

        let resolution = match outcome {
            Ok(value) => Resolution::Published(Arc::new(value)),
            Err(reason) => Resolution::Failed { reason },
        };
        let failed_reason = match &resolution {
            Resolution::Failed { reason } => Some(reason.clone()),
            Resolution::Published(_) => None,
        };

        // Respostas repetidas são ignoradas: o primeiro valor vale
        if entry.seal(resolution) {
            let event = match failed_reason {
                Some(reason) => LifecycleEvent::CapabilityFailed {
                    capability: capability.to_string(),
                    owner: entry.owner.clone(),
                    reason,
                },
                None => LifecycleEvent::CapabilityPublished {
                    capability: capability.to_string(),
                    owner: entry.owner.clone(),
                },
            };
            self.emit(event);
        }
        Ok(())
    }

    // === Consultas ===

    /// Capacidades locais de `owner` ainda não seladas
    pub fn unpublished(&self, owner: &str) -> Vec<String> {
        self.sorted_entries()
            .into_iter()
            .filter(|e| e.owner == owner && e.origin == EntryOrigin::Local && !e.is_sealed())
            .map(|e| e.name.clone())
            .collect()
    }

    /// Entradas locais (nome, dono), em ordem de registro
    pub fn local_registrations(&self) -> Vec<(String, String)> {
        self.sorted_entries()
            .into_iter()
            .filter(|e| e.origin == EntryOrigin::Local)
            .map(|e| (e.name.clone(), e.owner.clone()))
            .collect()
    }

    pub fn get(&self, capability: &str) -> Option<Arc<CapabilityEntry>> {
        self.lookup(capability)
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.lookup(capability).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot de todas as entradas, em ordem de registro
    pub fn snapshot(&self) -> Vec<CapabilityInfo> {
        self.sorted_entries()
            .into_iter()
            .map(|e| CapabilityInfo {
                name: e.name.clone(),
                owner: e.owner.clone(),
                origin: e.origin,
                status: e.status(),
            })
            .collect()
    }

    fn sorted_entries(&self) -> Vec<Arc<CapabilityEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.index);
        entries
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityTable")
            .field("entries", &self.len())
            .field("registration_open", &self.is_registration_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_register_and_snapshot() {
        let table = CapabilityTable::new();
        table.register("gcam-core", "GcamComponent").unwrap();
        table.register("gcam-hydro", "HydroComponent").unwrap();

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "gcam-core");
        assert_eq!(snapshot[1].status, EntryStatus::Pending);
    }

    #[test]
    fn test_duplicate_registration() {
        let table = CapabilityTable::new();
        table.register("temp", "A").unwrap();

        // Mesmo dono: idempotente
        assert!(table.register("temp", "A").is_ok());
        assert_eq!(table.len(), 1);

        let err = table.register("temp", "B").unwrap_err();
        assert!(matches!(err, CapabilityError::DuplicateCapability { ref owner, .. } if owner == "A"));
    }

    #[test]
    fn test_registration_window_closed() {
        let table = CapabilityTable::new();
        table.close_registration();
        let err = table.register("temp", "A").unwrap_err();
        assert!(matches!(err, CapabilityError::RegistrationWindowClosed { .. }));
    }

    #[test]
    fn test_publish_once() {
        let table = CapabilityTable::new();
        table.register("temp", "A").unwrap();
        table.close_registration();

        table.publish("temp", "A", json!(42)).unwrap();
        let err = table.publish("temp", "A", json!(43)).unwrap_err();
        assert_eq!(err, CapabilityError::AlreadyPublished("temp".into()));

        let value = table.fetch("temp", "B", None).unwrap();
        assert_eq!(*value, json!(42));
    }

    #[test]
    fn test_not_owner() {
        let table = CapabilityTable::new();
        table.register("temp", "A").unwrap();
        let err = table.publish("temp", "B", json!(1)).unwrap_err();
        assert!(matches!(err, CapabilityError::NotOwner { ref caller, .. } if caller == "B"));
        assert_eq!(table.get("temp").unwrap().status(), EntryStatus::Pending);
    }

    #[test]
    fn test_self_fetch_before_and_after_publish() {
        let table = CapabilityTable::new();
        table.register("temp", "A").unwrap();
        table.close_registration();

        let before = table.fetch("temp", "A", None).unwrap_err();
        assert!(matches!(before, CapabilityError::SelfFetch { .. }));

        table.publish("temp", "A", json!(1)).unwrap();
        let after = table.fetch("temp", "A", None).unwrap_err();
        assert!(matches!(after, CapabilityError::SelfFetch { .. }));
    }

    #[test]
    fn test_fetch_unknown_is_immediate() {
        let table = CapabilityTable::new();
        let err = table.fetch("nope", "B", None).unwrap_err();
        assert_eq!(err, CapabilityError::CapabilityNotFound("nope".into()));
    }

    #[test]
    fn test_fetch_blocks_until_publish() {
        let table = Arc::new(CapabilityTable::new());
        table.register("temp", "A").unwrap();
        table.close_registration();

        let reader = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.fetch("temp", "B", None))
        };

        thread::sleep(Duration::from_millis(20));
        table.publish("temp", "A", json!(42)).unwrap();

        assert_eq!(*reader.join().unwrap().unwrap(), json!(42));
    }

    #[test]
    fn test_fail_owner_wakes_waiters() {
        let table = Arc::new(CapabilityTable::new());
        table.register("temp", "A").unwrap();
        table.register("flow", "A").unwrap();
        table.close_registration();
        table.publish("flow", "A", json!("ok")).unwrap();

        let reader = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.fetch("temp", "B", None))
        };

        thread::sleep(Duration::from_millis(20));
        let failed = table.fail_owner("A", "status 1");
        assert_eq!(failed, vec!["temp".to_string()]);

        let err = reader.join().unwrap().unwrap_err();
        assert!(matches!(err, CapabilityError::DependencyFailed { ref owner, .. } if owner == "A"));

        // Capacidade publicada antes da falha continua válida
        assert_eq!(*table.fetch("flow", "B", None).unwrap(), json!("ok"));
    }

    #[test]
    fn test_fetch_timeout() {
        let table = CapabilityTable::new();
        table.register("temp", "A").unwrap();
        table.close_registration();

        let err = table
            .fetch("temp", "B", Some(Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(err, CapabilityError::FetchTimeout { timeout_ms: 10, .. }));
    }

    #[test]
    fn test_unpublished_lists_pending_local_entries() {
        let table = CapabilityTable::new();
        table.register("a", "A").unwrap();
        table.register("b", "A").unwrap();
        table.register_remote("c", "C", 1).unwrap();
        table.close_registration();
        table.publish("a", "A", json!(null)).unwrap();

        assert_eq!(table.unpublished("A"), vec!["b".to_string()]);
        assert_eq!(table.local_registrations().len(), 2);
    }

    struct EchoResolver {
        table: std::sync::Weak<CapabilityTable>,
        calls: AtomicUsize,
    }

    impl RemoteResolver for EchoResolver {
        fn request(&self, capability: &str, rank: Rank) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let table = self.table.upgrade().ok_or("table gone")?;
            let capability = capability.to_string();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                table
                    .resolve_remote(&capability, Ok(json!({ "rank": rank })))
                    .unwrap();
            });
            Ok(())
        }
    }

    #[test]
    fn test_remote_entry_requested_once() {
        let table = Arc::new(CapabilityTable::new());
        table.register_remote("gcam-core", "GcamComponent", 2).unwrap();
        table.close_registration();

        let resolver = Arc::new(EchoResolver {
            table: Arc::downgrade(&table),
            calls: AtomicUsize::new(0),
        });
        assert!(table.set_remote_resolver(resolver.clone()));

        let readers: Vec<_> = (0..4)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.fetch("gcam-core", &format!("reader-{i}"), None))
            })
            .collect();

        for reader in readers {
            assert_eq!(*reader.join().unwrap().unwrap(), json!({ "rank": 2 }));
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_without_resolver_fails_fast() {
        let table = CapabilityTable::new();
        table.register_remote("gcam-core", "GcamComponent", 1).unwrap();
        table.close_registration();

        let err = table.fetch("gcam-core", "B", None).unwrap_err();
        assert!(matches!(err, CapabilityError::DependencyFailed { .. }));
    }

    #[test]
    fn test_fail_rank() {
        let table = CapabilityTable::new();
        table.register_remote("x", "X", 1).unwrap();
        table.register_remote("y", "Y", 2).unwrap();
        table.close_registration();

        assert_eq!(table.fail_rank(1, "peer lost"), vec!["x".to_string()]);
        assert_eq!(table.get("y").unwrap().status(), EntryStatus::Pending);
    }
}
