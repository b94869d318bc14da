//! Carrier-WiFi 网关 HA 主程序
//!
//! 按子命令启动网关健康服务（gateway）或集群 HA operator（operator）；
//! 不带子命令时启动配置文件中出现的全部角色。

mod cli;
mod error;
mod observability;
mod service;

use clap::Parser;
use ha_common::config::{GatewayHealthConfig, HaConfig};
use observability::init_observability;
use service::{HealthGrpcService, MetricsHttpService, ReconcileDriver};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use tracing::{error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Which roles the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Roles {
    Gateway,
    Operator,
    /// Every role that has a section in the config file.
    Configured,
}

impl Roles {
    fn gateway(self, config: &HaConfig) -> Result<bool> {
        match self {
            Roles::Gateway if config.gateway.is_none() => Err(Error::service_validation(
                "the gateway command requires a [gateway] section",
            )),
            Roles::Gateway => Ok(true),
            Roles::Operator => Ok(false),
            Roles::Configured => Ok(config.gateway.is_some()),
        }
    }

    fn operator(self, config: &HaConfig) -> Result<bool> {
        match self {
            Roles::Operator if config.operator.is_none() => Err(Error::service_validation(
                "the operator command requires an [operator] section",
            )),
            Roles::Operator => Ok(true),
            Roles::Gateway => Ok(false),
            Roles::Configured => Ok(config.operator.is_some()),
        }
    }
}

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let roles = match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            return ApplicationLauncher::test_config_file(&config_path);
        }
        Some(Commands::Gateway { .. }) => Roles::Gateway,
        Some(Commands::Operator) => Roles::Operator,
        None => Roles::Configured,
    };
    let health_config = match &cli.command {
        Some(Commands::Gateway { health_config }) => health_config.clone(),
        _ => None,
    };

    let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(ApplicationLauncher::run_application(
        &config_path,
        health_config.as_deref(),
        roles,
    ))
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        let fallback_paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/wifi-ha/config.toml"),
        ];

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: wifi-ha --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载并验证配置；只有 "Warning:" 开头的问题不会阻止启动
    ///
    /// `health_config` replaces the `[gateway]` section before validation.
    fn load_config(config_path: &Path, health_config: Option<&Path>) -> Result<HaConfig> {
        let mut config = HaConfig::from_file(config_path).map_err(|e| {
            bootstrap_error!("❌ 配置解析失败: {}", e);
            Error::service_validation(format!("配置解析失败: {e}"))
        })?;
        if let Some(path) = health_config {
            bootstrap_info!("📄 网关健康配置: {:?}", path);
            if !path.exists() {
                bootstrap_info!("  ⚠️  文件不存在，使用默认网关健康配置");
            }
            config.gateway = Some(GatewayHealthConfig::load_or_default(path));
        }

        if let Err(errors) = config.validate() {
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                return Err(Error::service_validation("配置验证失败".to_string()));
            }
        }

        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        let config = Self::load_config(config_path, None)?;
        bootstrap_info!("✅ 配置文件解析成功: {:?}", config_path);
        bootstrap_info!(
            "  - gateway: {}",
            if config.gateway.is_some() { "configured" } else { "-" }
        );
        bootstrap_info!(
            "  - operator: {}",
            match &config.operator {
                Some(operator) => format!("{} cluster(s)", operator.clusters.len()),
                None => "-".to_string(),
            }
        );
        bootstrap_info!("✅ 完整配置验证通过");
        Ok(())
    }

    /// 运行应用程序的主入口
    async fn run_application(
        config_path: &Path,
        health_config: Option<&Path>,
        roles: Roles,
    ) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);
        let config = Self::load_config(config_path, health_config)?;

        let run_gateway = roles.gateway(&config)?;
        let run_operator = roles.operator(&config)?;
        if !run_gateway && !run_operator {
            return Err(Error::service_validation(
                "nothing to run: configure [gateway] and/or [operator]",
            ));
        }

        let component = match (run_gateway, run_operator) {
            (true, false) => Some("gateway"),
            (false, true) => Some("operator"),
            _ => None,
        };
        let _observability_guard = init_observability(&config, component)?;

        if let Err(e) = ha_common::metrics::register_metrics() {
            warn!(
                "Prometheus metrics registration warning (may already be registered): {}",
                e
            );
        }

        info!("🚀 启动 {} ({:?})", config.name, roles);

        let (shutdown_tx, _) = broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone());

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        if run_gateway && let Some(gateway_cfg) = &config.gateway {
            let service = HealthGrpcService::new(gateway_cfg.clone());
            let handle = service
                .start(shutdown_tx.clone())
                .await
                .map_err(|e| Error::service_startup(format!("网关健康服务启动失败: {e:#}")))?;
            handles.push(handle);
        }

        if run_operator && let Some(operator_cfg) = &config.operator {
            let driver = ReconcileDriver::new(operator_cfg.clone())
                .map_err(|e| Error::service_startup(format!("HA operator 启动失败: {e:#}")))?;
            handles.extend(driver.start(&shutdown_tx));
        }

        if let Some(bind) = &config.observability.metrics_bind {
            let handle = MetricsHttpService::new(bind.clone())
                .start(shutdown_tx.clone())
                .await
                .map_err(|e| Error::service_startup(format!("指标服务启动失败: {e:#}")))?;
            handles.push(handle);
        }

        info!("✅ 所有服务已启动");

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Service task terminated unexpectedly: {}", e);
                let _ = shutdown_tx.send(());
            }
        }

        info!("🛑 所有服务已安全关闭");
        Ok(())
    }
}

/// 设置Ctrl-C信号处理程序
fn setup_ctrl_c_handler(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
