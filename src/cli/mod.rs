use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::network::KeepaliveConfig;

#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Resumable file transfers and a tiny command shell over TCP", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Seconds of idle before keepalive probing starts
    #[arg(long, global = true, default_value_t = 10)]
    pub keepalive_idle: u64,

    /// Seconds between keepalive probes
    #[arg(long, global = true, default_value_t = 5)]
    pub keepalive_interval: u64,

    /// Failed probes before the connection is declared dead
    #[arg(long, global = true, default_value_t = 4)]
    pub keepalive_fails: u32,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve files and commands to one client at a time
    Serve {
        /// Address to listen on
        ip: IpAddr,

        /// Port to listen on
        #[arg(long, short = 'p', default_value_t = 8080)]
        port: u16,

        /// Directory the served files live in
        #[arg(long, default_value = "files")]
        root: PathBuf,
    },

    /// Open an interactive shell against a server
    Connect {
        /// Server host
        host: String,

        /// Server port
        port: u16,

        /// Directory downloaded files are written to
        #[arg(long, default_value = "client_files")]
        root: PathBuf,

        /// How long to wait for the server's next frame
        #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
        timeout: Duration,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            idle: Duration::from_secs(self.keepalive_idle),
            interval: Duration::from_secs(self.keepalive_interval),
            max_fails: self.keepalive_fails,
        }
    }
}
