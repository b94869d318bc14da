//! Gateway health - gRPC health actuator for carrier-WiFi access gateways
//!
//! Every gateway of an HA pair runs this actuator. The cluster operator
//! polls it over gRPC and drives failover through it.
//!
//! # Components
//!
//! - **ReachabilityProbe**: periodic ICMP probing of GRE tunnel peers
//! - **ServiceLifecycleProvider**: container-backed service health and restarts
//! - **SystemResourceProvider**: CPU / memory load, VIP and route ownership
//! - **GatewayHealthActuator**: the `Health` gRPC service
//!   - GetHealthStatus: combined verdict of the three checks above
//!   - Enable: take over the VIP and restart session services
//!   - Disable: release the VIP and restart the AAA service
//!
//! # Architecture
//!
//! ```text
//!     ┌─────────────────────┐                    ┌─────────────────────────┐
//!     │     ha-operator     │                    │        gateway          │
//!     ├─────────────────────┤                    ├─────────────────────────┤
//!     │                     │  GetHealthStatus   │  GatewayHealthActuator  │
//!     │  ClusterReconciler  │ ─────────────────► │   ├─ ReachabilityProbe  │
//!     │                     │  Enable / Disable  │   ├─ ServiceLifecycle   │
//!     │                     │ ─────────────────► │   └─ SystemResource     │
//!     └─────────────────────┘                    └─────────────────────────┘
//! ```

mod command;

pub mod actuator;
pub mod error;
pub mod events;
pub mod network;
pub mod probe;
pub mod services;
pub mod stats;
pub mod system;

// Re-export important types
pub use actuator::{GatewayHealthActuator, GatewayHealthActuatorBuilder, GatewayRole, Verdict};
pub use error::{HealthError, Result};
pub use events::{EventSink, GatewayEvent, TracingEventSink};
pub use network::{InterfaceNetwork, IpCommand, Route};
pub use probe::{
    CommandPinger, IcmpProbe, NoOpProbe, Pinger, PingerFactory, ProbeSettings, ReachabilityProbe,
    ReachabilityStatus,
};
pub use services::{
    ContainerRuntime, ContainerRuntimeProvider, ContainerSummary, DockerCli,
    ServiceLifecycleProvider,
};
pub use stats::{StatsError, SystemStats, collect_system_stats};
pub use system::{HostNetworkProvider, SystemResourceProvider};

// Re-export the wire types used with the actuator
pub use ha_proto::{
    DisableMessage, Health, HealthClient, HealthServer, HealthState, HealthStatus, Void,
};
