//! Execução distribuída: dois ranks sobre canais em memória e sobre TCP

mod common;

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use cassandra_core::error::{EXIT_DEPENDENCY_FAILED, EXIT_PROTOCOL_ERROR};
use cassandra_orchestration::distributed::Registration;
use cassandra_orchestration::*;
use common::*;

fn two_rank_config(cluster: ClusterConfig) -> RunConfig {
    RunConfig::default()
        .with_cluster(cluster)
        .with_component(
            ComponentSpec::new("Producer")
                .with_name("gcam")
                .with_param("capability", "gcam-core")
                .with_param("value", "ok")
                .with_param("delay_ms", "30"),
        )
        .with_component(
            ComponentSpec::new("Consumer")
                .with_name("hydro")
                .with_rank(1)
                .with_param("requires", "gcam-core")
                .with_param("expect", "ok"),
        )
}

fn dummy_cluster() -> ClusterConfig {
    ClusterConfig::new(vec!["rank0".to_string(), "rank1".to_string()])
}

/// Roda todos os ranks em paralelo e devolve os relatórios em ordem de rank
fn run_mesh(orch: &Orchestrator, transports: Vec<Arc<dyn Transport>>) -> Vec<RunReport> {
    thread::scope(|scope| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| scope.spawn(move || orch.run_with_transport(transport)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    })
}

fn channel_mesh(size: usize) -> Vec<Arc<dyn Transport>> {
    ChannelTransport::mesh(size)
        .into_iter()
        .map(|t| Arc::new(t) as Arc<dyn Transport>)
        .collect()
}

#[test]
fn test_remote_fetch_over_channels() {
    let orch = Orchestrator::new(two_rank_config(dummy_cluster()), test_factory()).unwrap();
    let reports = run_mesh(&orch, channel_mesh(2));

    for report in &reports {
        assert!(report.success, "{report:?}");
        assert_eq!(report.components.len(), 2);
        assert_eq!(report.get("hydro").unwrap().rank, 1);
    }
    // Ambos os ranks veem o mesmo relatório global
    assert_eq!(reports[0].components, reports[1].components);
}

#[test]
fn test_remote_owner_failure_propagates() {
    let config = RunConfig::default()
        .with_cluster(dummy_cluster())
        .with_component(
            ComponentSpec::new("Producer")
                .with_name("gcam")
                .with_param("capability", "gcam-core")
                .with_param("status", "5"),
        )
        .with_component(
            ComponentSpec::new("Consumer")
                .with_name("hydro")
                .with_rank(1)
                .with_param("requires", "gcam-core"),
        );

    let orch = Orchestrator::new(config, test_factory()).unwrap();
    let reports = run_mesh(&orch, channel_mesh(2));

    for report in &reports {
        assert!(!report.success);
        assert_eq!(report.exit_code, 5);

        let hydro = report.get("hydro").unwrap();
        assert_eq!(hydro.state, ComponentState::Failed);
        assert_eq!(hydro.code, EXIT_DEPENDENCY_FAILED);
    }
}

#[test]
fn test_lost_peer_seals_its_capabilities() {
    let config = RunConfig::default()
        .with_cluster(dummy_cluster())
        .with_component(
            ComponentSpec::new("Consumer")
                .with_name("hydro")
                .with_param("requires", "ghost-data"),
        )
        .with_component(
            ComponentSpec::new("Producer")
                .with_name("ghost")
                .with_rank(1)
                .with_param("capability", "ghost-data"),
        );

    let mut mesh = ChannelTransport::mesh(2);
    let rank1 = mesh.pop().unwrap();
    let rank0 = mesh.pop().unwrap();

    // Rank 1 anuncia e cai antes de servir qualquer coisa
    rank1
        .send(
            0,
            CoordinationMessage::Announce {
                capabilities: vec![Registration {
                    capability: "ghost-data".into(),
                    owner: "ghost".into(),
                }],
            },
        )
        .unwrap();
    rank1.disconnect();

    let orch = Orchestrator::new(config, test_factory()).unwrap();
    let report = orch.run_with_transport(Arc::new(rank0)).unwrap();

    assert!(!report.success);
    assert_eq!(report.exit_code, EXIT_DEPENDENCY_FAILED);

    let ghost = report.get("ghost").unwrap();
    assert_eq!(ghost.code, EXIT_PROTOCOL_ERROR);
    assert!(ghost.error.as_deref().unwrap().contains("lost"));
    assert_eq!(report.capabilities[0].status, EntryStatus::Failed);
}

#[test]
fn test_cross_rank_duplicate_aborts_every_rank() {
    let config = RunConfig::default()
        .with_cluster(dummy_cluster())
        .with_component(
            ComponentSpec::new("Producer")
                .with_name("a")
                .with_param("capability", "temp"),
        )
        .with_component(
            ComponentSpec::new("Producer")
                .with_name("b")
                .with_rank(1)
                .with_param("capability", "temp"),
        );

    let orch = Orchestrator::new(config, test_factory()).unwrap();
    let orch = &orch;
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = channel_mesh(2)
            .into_iter()
            .map(|transport| scope.spawn(move || orch.run_with_transport(transport)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert!(matches!(
            result,
            Err(OrchestrationError::Capability(CapabilityError::DuplicateCapability { .. }))
        ));
    }
}

#[test]
fn test_transport_size_must_match_cluster() {
    let orch = Orchestrator::new(two_rank_config(dummy_cluster()), test_factory()).unwrap();
    let single = channel_mesh(1).pop().unwrap();
    assert!(matches!(
        orch.run_with_transport(single),
        Err(OrchestrationError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_remote_fetch_over_tcp() {
    let listeners: Vec<TcpListener> = (0..2)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let addrs = listeners
        .iter()
        .map(|l| l.local_addr().unwrap().to_string())
        .collect();
    let cluster = ClusterConfig::new(addrs).with_connect_timeout_ms(5_000);

    let transports: Vec<Arc<dyn Transport>> = listeners
        .into_iter()
        .enumerate()
        .map(|(rank, listener)| {
            Arc::new(TcpTransport::from_listener(rank, listener, &cluster).unwrap()) as Arc<dyn Transport>
        })
        .collect();

    let orch = Orchestrator::new(two_rank_config(cluster), test_factory()).unwrap();
    let reports = run_mesh(&orch, transports);

    for report in &reports {
        assert!(report.success, "{report:?}");
    }
}
