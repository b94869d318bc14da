//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wifi-ha")]
#[command(version)]
#[command(about = "Active/standby HA for carrier-WiFi access gateways")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the gateway health service (requires a [gateway] section)
    Gateway {
        /// Read the [gateway] section from this file instead; documented
        /// defaults apply when it is missing or unreadable
        #[arg(long)]
        health_config: Option<PathBuf>,
    },

    /// Run the cluster HA operator (requires an [operator] section)
    Operator,

    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },
}
