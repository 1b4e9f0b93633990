//! Command line and environment configuration.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use quickdocker_runtime::ComposeConfig;
use quickdocker_session::{BroadcastConfig, ExecConfig};

/// Local Docker control plane.
#[derive(Parser, Debug, Clone)]
#[command(name = "quickdocker")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "QUICKDOCKER_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to bind
    #[arg(long, env = "QUICKDOCKER_PORT", default_value_t = 18093)]
    pub port: u16,

    /// Docker endpoint (unix://, tcp:// or http://). Local defaults when unset
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Directory holding the built frontend
    #[arg(long, env = "QUICKDOCKER_FRONTEND", value_name = "DIR")]
    pub frontend_dir: Option<PathBuf>,

    /// Shell started by exec sessions
    #[arg(long, env = "QUICKDOCKER_SHELL", default_value = "/bin/sh")]
    pub shell: String,

    /// Upper bound on one blocking session read, in milliseconds
    #[arg(
        long,
        env = "QUICKDOCKER_READ_TIMEOUT_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub read_timeout_ms: u64,

    /// Interval between state snapshots, in milliseconds
    #[arg(
        long,
        env = "QUICKDOCKER_STATE_INTERVAL_MS",
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub state_interval_ms: u64,

    /// Limit on one compose command, in seconds
    #[arg(
        long,
        env = "QUICKDOCKER_COMPOSE_TIMEOUT_SECS",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub compose_timeout_secs: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn exec(&self) -> ExecConfig {
        ExecConfig {
            command: vec![self.shell.clone()],
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            ..ExecConfig::default()
        }
    }

    #[must_use]
    pub const fn broadcast(&self) -> BroadcastConfig {
        BroadcastConfig {
            interval: Duration::from_millis(self.state_interval_ms),
        }
    }

    #[must_use]
    pub fn compose(&self) -> ComposeConfig {
        ComposeConfig {
            timeout: Duration::from_secs(self.compose_timeout_secs),
            ..ComposeConfig::default()
        }
    }

    /// The configured frontend, else `frontend/` beside the executable when present.
    #[must_use]
    pub fn frontend(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.frontend_dir {
            return Some(dir.clone());
        }
        let exe = std::env::current_exe().ok()?;
        let dir = exe.parent()?.join("frontend");
        dir.is_dir().then_some(dir)
    }
}
