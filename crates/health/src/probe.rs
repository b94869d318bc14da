//! GRE 隧道对端可达性探测
//!
//! Each configured peer is pinged on its own periodic task. A round that
//! gets at least one echo reply marks the peer reachable; the latest round
//! wins. The aggregated view is read by the actuator on every health query.

use crate::command;
use crate::error::{HealthError, Result};
use async_trait::async_trait;
use ha_common::GatewayHealthConfig;
use ha_common::metrics;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Partition of probed peers by the outcome of their latest round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityStatus {
    pub reachable: HashSet<IpAddr>,
    pub unreachable: HashSet<IpAddr>,
}

impl ReachabilityStatus {
    pub fn is_empty(&self) -> bool {
        self.reachable.is_empty() && self.unreachable.is_empty()
    }
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Begin probing every configured peer. Calling it while running is a no-op.
    async fn start(&self) -> Result<()>;

    /// Stop all probing tasks and forget every recorded result.
    async fn stop(&self);

    /// Snapshot of the latest round per peer. Peers never probed yet are absent.
    async fn status(&self) -> ReachabilityStatus;
}

/// Probe used when no GRE peers are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProbe;

#[async_trait]
impl ReachabilityProbe for NoOpProbe {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn status(&self) -> ReachabilityStatus {
        ReachabilityStatus::default()
    }
}

/// One ICMP echo round against a fixed target.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Send `count` echo requests and return how many replies came back.
    async fn ping(&self, count: u32, timeout: Duration) -> Result<u32>;
}

/// Builds a pinger for one peer. Failing here aborts `start`.
pub type PingerFactory = Arc<dyn Fn(IpAddr) -> Result<Arc<dyn Pinger>> + Send + Sync>;

/// Pinger backed by the system `ping` utility.
#[derive(Debug, Clone)]
pub struct CommandPinger {
    target: IpAddr,
}

impl CommandPinger {
    pub fn new(target: IpAddr) -> Result<Self> {
        let rejected = match target {
            IpAddr::V4(v4) => v4.is_unspecified() || v4.is_multicast() || v4.is_broadcast(),
            IpAddr::V6(v6) => v6.is_unspecified() || v6.is_multicast(),
        };
        if rejected {
            return Err(HealthError::Probe(format!(
                "{target} is not a unicast address and cannot be pinged"
            )));
        }
        Ok(Self { target })
    }
}

#[async_trait]
impl Pinger for CommandPinger {
    async fn ping(&self, count: u32, timeout: Duration) -> Result<u32> {
        let count_arg = count.to_string();
        let timeout_arg = timeout.as_secs().max(1).to_string();
        let target_arg = self.target.to_string();
        let family = if self.target.is_ipv6() { "-6" } else { "-4" };

        // ping exits non-zero when nothing answers; only the summary matters
        let output = command::output(
            "ping",
            &[
                family,
                "-n",
                "-q",
                "-c",
                &count_arg,
                "-W",
                &timeout_arg,
                &target_arg,
            ],
        )
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_received(&stdout).ok_or_else(|| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            HealthError::Probe(format!(
                "no ping summary for {}: {}",
                self.target,
                stderr.trim()
            ))
        })
    }
}

/// Extract the reply count from a `ping` summary line such as
/// `3 packets transmitted, 2 received, 33% packet loss, time 2003ms`.
fn parse_received(output: &str) -> Option<u32> {
    let summary = output.lines().find(|l| l.contains("transmitted"))?;
    summary
        .split(',')
        .map(str::trim)
        .find(|part| part.ends_with("received"))
        .and_then(|part| part.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

/// 探测参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub packet_count: u32,
    pub timeout: Duration,
}

impl ProbeSettings {
    pub fn from_config(config: &GatewayHealthConfig) -> Self {
        Self {
            interval: config.probe_interval(),
            packet_count: config.icmp_packet_count,
            timeout: config.probe_timeout(),
        }
    }
}

struct ProbeLoop {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

/// ICMP reachability probe over a fixed set of single-host peers.
pub struct IcmpProbe {
    targets: Vec<IpAddr>,
    settings: ProbeSettings,
    factory: PingerFactory,
    statuses: Arc<RwLock<HashMap<IpAddr, bool>>>,
    running: Mutex<Option<ProbeLoop>>,
}

impl IcmpProbe {
    pub fn new(targets: Vec<IpAddr>, settings: ProbeSettings) -> Self {
        Self {
            targets,
            settings,
            factory: Arc::new(|target| {
                let pinger: Arc<dyn Pinger> = Arc::new(CommandPinger::new(target)?);
                Ok(pinger)
            }),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            running: Mutex::new(None),
        }
    }

    pub fn from_config(config: &GatewayHealthConfig) -> Self {
        Self::new(config.gre_peers.clone(), ProbeSettings::from_config(config))
    }

    /// Override how pingers are built for each peer.
    pub fn with_pinger_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(IpAddr) -> Result<Arc<dyn Pinger>> + Send + Sync + 'static,
    {
        self.factory = Arc::new(factory);
        self
    }

    async fn record(statuses: &RwLock<HashMap<IpAddr, bool>>, target: IpAddr, reachable: bool) {
        let previous = statuses.write().await.insert(target, reachable);
        if previous != Some(reachable) {
            metrics::set_gre_peer_reachable(&target.to_string(), reachable);
            if reachable {
                info!("GRE peer {} is reachable", target);
            } else {
                warn!("GRE peer {} is unreachable", target);
            }
        }
    }

    async fn probe_loop(
        target: IpAddr,
        pinger: Arc<dyn Pinger>,
        settings: ProbeSettings,
        statuses: Arc<RwLock<HashMap<IpAddr, bool>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Probe loop for {} stopped", target);
                    break;
                }
                _ = async {
                    ticker.tick().await;
                    let reachable = match pinger.ping(settings.packet_count, settings.timeout).await {
                        Ok(received) => received > 0,
                        Err(e) => {
                            debug!("Ping round for {} failed: {}", target, e);
                            false
                        }
                    };
                    Self::record(&statuses, target, reachable).await;
                } => {}
            }
        }
    }
}

#[async_trait]
impl ReachabilityProbe for IcmpProbe {
    async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("ICMP probe already running");
            return Ok(());
        }

        // Build every pinger before spawning anything so a failure leaves no partial set.
        let pingers = self
            .targets
            .iter()
            .map(|target| (self.factory)(*target).map(|pinger| (*target, pinger)))
            .collect::<Result<Vec<_>>>()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = pingers
            .into_iter()
            .map(|(target, pinger)| {
                tokio::spawn(Self::probe_loop(
                    target,
                    pinger,
                    self.settings,
                    self.statuses.clone(),
                    shutdown_tx.subscribe(),
                ))
            })
            .collect();

        info!(
            "ICMP probe started for {} GRE peer(s), interval {:?}",
            self.targets.len(),
            self.settings.interval
        );
        *running = Some(ProbeLoop {
            shutdown_tx,
            handles,
        });
        Ok(())
    }

    async fn stop(&self) {
        let Some(probe_loop) = self.running.lock().await.take() else {
            return;
        };

        let _ = probe_loop.shutdown_tx.send(());
        for handle in probe_loop.handles {
            if let Err(e) = handle.await {
                warn!("Probe task ended abnormally: {}", e);
            }
        }

        self.statuses.write().await.clear();
        for target in &self.targets {
            metrics::clear_gre_peer(&target.to_string());
        }
        info!("ICMP probe stopped");
    }

    async fn status(&self) -> ReachabilityStatus {
        let statuses = self.statuses.read().await;
        let mut status = ReachabilityStatus::default();
        for (target, reachable) in statuses.iter() {
            if *reachable {
                status.reachable.insert(*target);
            } else {
                status.unreachable.insert(*target);
            }
        }
        status
    }
}
