use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "tsingress",
    about = "Dashboard for Kubernetes Ingress resources served by the Tailscale operator"
)]
pub struct Config {
    /// Address the dashboard listens on
    #[arg(long, env = "TSINGRESS_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Seconds between automatic refreshes of the dashboard page
    #[arg(long, env = "TSINGRESS_REFRESH_SECS", default_value_t = 10)]
    pub refresh_secs: u64,

    /// Log output format
    #[arg(long, env = "TSINGRESS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
