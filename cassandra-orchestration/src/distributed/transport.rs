//! Transportes entre ranks
//!
//! | Transporte | Uso |
//! |:-----------|:----|
//! | [`TcpTransport`] | Processos separados (std TCP, uma linha JSON por mensagem) |
//! | [`ChannelTransport`] | Malha em memória (crossbeam) para testes |
//!
//! Todo transporte entrega o que recebe em um único canal de
//! [`Incoming`]; a perda de um peer chega como `Incoming::Disconnected`.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use crossbeam_channel::{unbounded, Receiver, Sender};

use super::message::{CoordinationMessage, Envelope};
use crate::capability::Rank;
use crate::config::ClusterConfig;
use crate::error::{OrchestrationError, OrchestrationResult};

/// Evento entregue pelo transporte
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(Envelope),
    /// Conexão com o rank caiu
    Disconnected(Rank),
}

/// Canal ponto a ponto entre ranks
pub trait Transport: Send + Sync {
    /// Rank deste processo
    fn rank(&self) -> Rank;

    /// Número total de ranks
    fn size(&self) -> usize;

    /// Envia uma mensagem para `to`
    fn send(&self, to: Rank, message: CoordinationMessage) -> OrchestrationResult<()>;

    /// Fila de entrada (todas as origens)
    fn incoming(&self) -> Receiver<Incoming>;

    /// Encerra conexões e threads de I/O
    fn shutdown(&self) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Malha de canais crossbeam: um inbox por rank
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    rank: Rank,
    peers: Vec<Sender<Incoming>>,
    inbox: Receiver<Incoming>,
    closed: Arc<AtomicBool>,
}

impl ChannelTransport {
    /// Cria `size` transportes conectados entre si
    pub fn mesh(size: usize) -> Vec<ChannelTransport> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ChannelTransport {
                rank,
                peers: senders.clone(),
                inbox,
                closed: Arc::new(AtomicBool::new(false)),
            })
            .collect()
    }

    /// Simula a queda deste rank: os peers recebem `Disconnected`
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for (rank, peer) in self.peers.iter().enumerate() {
            if rank != self.rank {
                let _ = peer.send(Incoming::Disconnected(self.rank));
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, to: Rank, message: CoordinationMessage) -> OrchestrationResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(OrchestrationError::Transport(format!("rank {} is closed", self.rank)));
        }
        let peer = self
            .peers
            .get(to)
            .ok_or_else(|| OrchestrationError::Transport(format!("unknown rank {to}")))?;
        peer.send(Incoming::Message(Envelope::new(self.rank, message)))
            .map_err(|_| OrchestrationError::Transport(format!("rank {to} is gone")))
    }

    fn incoming(&self) -> Receiver<Incoming> {
        self.inbox.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TCP TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Conexão de saída para um peer
type Outbound = Mutex<Option<BufWriter<TcpStream>>>;

/// TCP: um listener por rank, conexões de saída abertas sob demanda
pub struct TcpTransport {
    rank: Rank,
    addrs: Vec<String>,
    local_addr: SocketAddr,
    outbound: Vec<Outbound>,
    inbox_tx: Sender<Incoming>,
    inbox_rx: Receiver<Incoming>,
    connect_timeout: Duration,
    connect_retry: Duration,
    stopped: Arc<AtomicBool>,
    inbound: Arc<Mutex<Vec<TcpStream>>>,
}

impl TcpTransport {
    /// Escuta no endereço do próprio rank
    pub fn bind(rank: Rank, cluster: &ClusterConfig) -> OrchestrationResult<Self> {
        let addr = cluster.ranks.get(rank).ok_or_else(|| {
            OrchestrationError::InvalidConfiguration(format!(
                "rank {rank} has no address ({} configured)",
                cluster.ranks.len()
            ))
        })?;
        let listener = TcpListener::bind(addr.as_str())?;
        Self::from_listener(rank, listener, cluster)
    }

    /// Usa um listener já aberto (ex.: porta efêmera em testes)
    pub fn from_listener(
        rank: Rank,
        listener: TcpListener,
        cluster: &ClusterConfig,
    ) -> OrchestrationResult<Self> {
        let (inbox_tx, inbox_rx) = unbounded();
        let local_addr = listener.local_addr()?;

        let transport = Self {
            rank,
            addrs: cluster.ranks.clone(),
            local_addr,
            outbound: (0..cluster.ranks.len()).map(|_| Mutex::new(None)).collect(),
            inbox_tx,
            inbox_rx,
            connect_timeout: Duration::from_millis(cluster.connect_timeout_ms),
            connect_retry: Duration::from_millis(cluster.connect_retry_ms.max(1)),
            stopped: Arc::new(AtomicBool::new(false)),
            inbound: Arc::new(Mutex::new(Vec::new())),
        };
        transport.spawn_acceptor(listener)?;

        tracing::info!(rank, addr = %local_addr, "rank listening");
        Ok(transport)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn spawn_acceptor(&self, listener: TcpListener) -> OrchestrationResult<()> {
        let inbox = self.inbox_tx.clone();
        let stopped = Arc::clone(&self.stopped);
        let inbound = Arc::clone(&self.inbound);
        let rank = self.rank;

        thread::Builder::new()
            .name(format!("cassandra-accept-{rank}"))
            .spawn(move || {
                for stream in listener.incoming() {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    match stream {
                        Ok(stream) => {
                            if let Ok(clone) = stream.try_clone() {
                                if let Ok(mut list) = inbound.lock() {
                                    list.push(clone);
                                }
                            }
                            let inbox = inbox.clone();
                            let spawned = thread::Builder::new()
                                .name(format!("cassandra-read-{rank}"))
                                .spawn(move || read_loop(stream, inbox));
                            if let Err(err) = spawned {
                                tracing::error!(rank, %err, "failed to spawn reader");
                            }
                        }
                        Err(err) => tracing::warn!(rank, %err, "accept failed"),
                    }
                }
            })?;
        Ok(())
    }

    /// Conecta com retry até `connect_timeout`
    fn connect(&self, to: Rank) -> OrchestrationResult<TcpStream> {
        let addr = self
            .addrs
            .get(to)
            .ok_or_else(|| OrchestrationError::Transport(format!("unknown rank {to}")))?;
        let deadline = Instant::now() + self.connect_timeout;

        loop {
            let attempt = addr
                .to_socket_addrs()
                .map_err(OrchestrationError::from)
                .and_then(|mut addrs| {
                    addrs.next().ok_or_else(|| {
                        OrchestrationError::Transport(format!("cannot resolve {addr}"))
                    })
                })
                .and_then(|sock| TcpStream::connect(sock).map_err(OrchestrationError::from));

            match attempt {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(from = self.rank, to, %addr, "connected");
                    return Ok(stream);
                }
                Err(err) if Instant::now() >= deadline => {
                    return Err(OrchestrationError::Transport(format!(
                        "rank {to} unreachable at {addr}: {err}"
                    )));
                }
                Err(_) => thread::sleep(self.connect_retry),
            }
        }
    }

    fn write(&self, writer: &mut BufWriter<TcpStream>, envelope: &Envelope) -> OrchestrationResult<()> {
        writer.write_all(&envelope.encode()?)?;
        writer.flush()?;
        Ok(())
    }
}

fn read_loop(stream: TcpStream, inbox: Sender<Incoming>) {
    let mut peer: Option<Rank> = None;

    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match Envelope::decode(&line) {
            Ok(envelope) => {
                peer = Some(envelope.from);
                if inbox.send(Incoming::Message(envelope)).is_err() {
                    return;
                }
            }
            Err(err) => tracing::warn!(%err, "dropping malformed line"),
        }
    }

    if let Some(rank) = peer {
        let _ = inbox.send(Incoming::Disconnected(rank));
    }
}

impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.addrs.len()
    }

    fn send(&self, to: Rank, message: CoordinationMessage) -> OrchestrationResult<()> {
        let slot = self
            .outbound
            .get(to)
            .ok_or_else(|| OrchestrationError::Transport(format!("unknown rank {to}")))?;
        let mut slot = slot.lock()?;

        if slot.is_none() {
            let mut writer = BufWriter::new(self.connect(to)?);
            self.write(&mut writer, &Envelope::new(self.rank, CoordinationMessage::Hello))?;
            *slot = Some(writer);
        }

        let envelope = Envelope::new(self.rank, message);
        let result = match slot.as_mut() {
            Some(writer) => self.write(writer, &envelope),
            None => Err(OrchestrationError::Transport(format!("no connection to rank {to}"))),
        };

        if let Err(err) = &result {
            tracing::warn!(from = self.rank, to, %err, "send failed, dropping connection");
            *slot = None;
        }
        result
    }

    fn incoming(&self) -> Receiver<Incoming> {
        self.inbox_rx.clone()
    }

    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        for slot in &self.outbound {
            if let Ok(mut slot) = slot.lock() {
                if let Some(writer) = slot.take() {
                    let _ = writer.get_ref().shutdown(Shutdown::Both);
                }
            }
        }
        if let Ok(mut inbound) = self.inbound.lock() {
            for stream in inbound.drain(..) {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }

        // Acorda o accept bloqueado
        let _ = TcpStream::connect(self.local_addr);
        tracing::debug!(rank = self.rank, "transport shut down");
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Ranks distintos de `rank` em `0..size`
pub fn peers_of(rank: Rank, size: usize) -> impl Iterator<Item = Rank> {
    (0..size).filter(move |r| *r != rank)
}

/// Conjunto de ranks ainda pendentes
pub(crate) fn pending_peers(rank: Rank, size: usize) -> HashSet<Rank> {
    peers_of(rank, size).collect()
}
