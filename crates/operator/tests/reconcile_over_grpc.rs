use async_trait::async_trait;
use gateway_health::{
    GatewayHealthActuator, HealthError, HealthServer, ServiceLifecycleProvider, StatsError,
    SystemResourceProvider, SystemStats,
};
use ha_common::{GatewayHealthConfig, HaClusterConfig, OperatorConfig};
use ha_operator::{
    ClusterReconciler, ClusterStatusStore, ConnectionRegistry, FileStatusStore,
    GatewayRecreator, GatewayStatusReport, HealthRpcClient, InitState, OperatorResult,
    StatusPublisher,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Holds the VIP flag and a CPU reading the test can raise.
#[derive(Default)]
struct FakeSystem {
    vip_held: AtomicBool,
    cpu_pct: AtomicU32,
}

#[async_trait]
impl SystemResourceProvider for FakeSystem {
    async fn system_stats(&self) -> Result<SystemStats, StatsError> {
        Ok(SystemStats {
            cpu_util: f64::from(self.cpu_pct.load(Ordering::SeqCst)) / 100.0,
            mem_util: 0.2,
        })
    }

    async fn enable(&self) -> gateway_health::Result<()> {
        self.vip_held.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable(&self) -> gateway_health::Result<()> {
        self.vip_held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct NoServices;

#[async_trait]
impl ServiceLifecycleProvider for NoServices {
    async fn unhealthy_services(&self) -> gateway_health::Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn restart(&self, _service: &str) -> gateway_health::Result<()> {
        Ok(())
    }

    async fn stop(&self, _service: &str) -> gateway_health::Result<()> {
        Ok(())
    }
}

struct GrpcTestServer {
    address: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl GrpcTestServer {
    /// Graceful shutdown, so connected clients see the connection close.
    async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut self.handle).await;
    }
}

impl Drop for GrpcTestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

struct TestGateway {
    system: Arc<FakeSystem>,
    server: GrpcTestServer,
}

async fn start_gateway() -> TestGateway {
    let system = Arc::new(FakeSystem::default());
    system.cpu_pct.store(10, Ordering::SeqCst);

    let config = GatewayHealthConfig {
        cluster_virtual_ip: "10.10.10.5/24".to_string(),
        enable_restart_services: Vec::new(),
        disable_restart_services: Vec::new(),
        ..Default::default()
    };
    let actuator = GatewayHealthActuator::builder(config)
        .services(Arc::new(NoServices))
        .system(system.clone())
        .build()
        .expect("build actuator");

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr: SocketAddr = listener.local_addr().expect("read local addr");
    let incoming = TcpListenerStream::new(listener);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(HealthServer::new(actuator))
            .serve_with_incoming_shutdown(incoming, async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("run health server");
    });

    TestGateway {
        system,
        server: GrpcTestServer {
            address: addr.to_string(),
            shutdown_tx: Some(shutdown_tx),
            handle,
        },
    }
}

#[derive(Default)]
struct RecordingRecreator {
    recreated: Mutex<Vec<String>>,
}

#[async_trait]
impl GatewayRecreator for RecordingRecreator {
    async fn recreate(&self, gateway: &str) -> OperatorResult<()> {
        self.recreated.lock().unwrap().push(gateway.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    reports: Mutex<Vec<GatewayStatusReport>>,
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, report: &GatewayStatusReport) -> OperatorResult<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

struct Harness {
    _temp_dir: TempDir,
    cwag1: TestGateway,
    cwag2: TestGateway,
    store: Arc<FileStatusStore>,
    recreator: Arc<RecordingRecreator>,
    reconciler: ClusterReconciler,
    cluster: HaClusterConfig,
}

async fn harness() -> Harness {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let cwag1 = start_gateway().await;
    let cwag2 = start_gateway().await;

    let config = OperatorConfig {
        rpc_timeout_secs: 2,
        ..Default::default()
    };
    let registry = Arc::new(ConnectionRegistry::new(&config));
    registry.pin("cwag-1", cwag1.server.address.clone()).await;
    registry.pin("cwag-2", cwag2.server.address.clone()).await;

    let store = Arc::new(FileStatusStore::new(temp_dir.path()));
    let recreator = Arc::new(RecordingRecreator::default());
    let reconciler = ClusterReconciler::new(
        Arc::new(HealthRpcClient::new(registry, config.rpc_timeout())),
        store.clone(),
        recreator.clone(),
        Arc::new(RecordingPublisher::default()),
    )
    .with_intervals(Duration::from_secs(10), Duration::from_secs(3));

    Harness {
        _temp_dir: temp_dir,
        cwag1,
        cwag2,
        store,
        recreator,
        reconciler,
        cluster: HaClusterConfig {
            name: "cwf-ha".to_string(),
            pair_id: "pair-1".to_string(),
            gateway_resources: vec!["cwag-1".to_string(), "cwag-2".to_string()],
            max_consecutive_errors: 2,
        },
    }
}

impl Harness {
    async fn pass(&self) -> Duration {
        self.reconciler
            .reconcile(&self.cluster)
            .await
            .expect("reconcile pass")
    }

    async fn active(&self) -> Option<String> {
        self.store
            .load("cwf-ha")
            .await
            .expect("load status")
            .active
    }
}

#[tokio::test]
#[serial_test::serial]
async fn reconciler_assigns_roles_and_fails_over_on_unhealthy_active() {
    let h = harness().await;

    h.pass().await;
    assert_eq!(h.active().await.as_deref(), Some("cwag-1"));

    assert_eq!(h.pass().await, Duration::from_secs(10));
    assert!(h.cwag1.system.vip_held.load(Ordering::SeqCst));
    assert!(!h.cwag2.system.vip_held.load(Ordering::SeqCst));

    // Overloaded active: the healthy standby takes the VIP.
    h.cwag1.system.cpu_pct.store(95, Ordering::SeqCst);
    h.pass().await;

    assert_eq!(h.active().await.as_deref(), Some("cwag-2"));
    assert!(!h.cwag1.system.vip_held.load(Ordering::SeqCst));
    assert!(h.cwag2.system.vip_held.load(Ordering::SeqCst));
    assert!(h.recreator.recreated.lock().unwrap().is_empty());

    // Recovery of the old active does not move the VIP back.
    h.cwag1.system.cpu_pct.store(10, Ordering::SeqCst);
    h.pass().await;
    assert_eq!(h.active().await.as_deref(), Some("cwag-2"));
}

#[tokio::test]
#[serial_test::serial]
async fn reconciler_recreates_unreachable_active_after_ceiling() {
    let mut h = harness().await;
    h.pass().await;
    h.pass().await;
    assert!(h.cwag1.system.vip_held.load(Ordering::SeqCst));

    h.cwag1.server.stop().await;

    // First error stays below the ceiling of two.
    assert_eq!(h.pass().await, Duration::from_secs(3));
    assert_eq!(h.active().await.as_deref(), Some("cwag-1"));
    assert!(!h.cwag2.system.vip_held.load(Ordering::SeqCst));

    // At the ceiling the standby is promoted and the old active recreated.
    assert_eq!(h.pass().await, Duration::from_secs(3));
    let status = h.store.load("cwf-ha").await.expect("load status");
    assert_eq!(status.active.as_deref(), Some("cwag-2"));
    assert_eq!(status.active_init_state, InitState::Initialized);
    assert_eq!(status.standby_init_state, InitState::Uninitialized);
    assert!(h.cwag2.system.vip_held.load(Ordering::SeqCst));
    assert_eq!(*h.recreator.recreated.lock().unwrap(), vec!["cwag-1"]);
}

#[test]
fn errors_are_send_and_sync() {
    fn assert_traits<T: Send + Sync + std::error::Error>() {}
    assert_traits::<ha_operator::OperatorError>();
    assert_traits::<HealthError>();
}
