//! Command line configuration.

use clap::Parser;
use corelib::{Consistency, PartitionerKind};
use replication::ClusterConfig;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "chord-dht",
    version,
    about = "Chord ring emulator with eventual or chained replication"
)]
pub struct CliConfig {
    /// Nodes started at bootstrap
    #[arg(long, short, env = "DHT_NODES", default_value_t = 5)]
    pub nodes: usize,

    /// Copies per key, including the primary
    #[arg(long = "replication", short, env = "DHT_REPLICATION", default_value_t = 3)]
    pub replication_factor: usize,

    /// Chained (linearizable) replication instead of eventual
    #[arg(long, env = "DHT_LINEAR")]
    pub linear: bool,

    #[arg(long, env = "DHT_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Node `serial` listens on base port + serial; 0 picks ephemeral ports
    #[arg(long, env = "DHT_BASE_PORT", default_value_t = 64000)]
    pub base_port: u16,

    /// xxh3, blake3 or byte-ordered
    #[arg(long, env = "DHT_PARTITIONER", default_value_t = PartitionerKind::Xxh3)]
    pub partitioner: PartitionerKind,

    /// Milliseconds to wait for a reply
    #[arg(long, env = "DHT_TIMEOUT_MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Run the commands of a file instead of reading stdin
    #[arg(long, short, env = "DHT_FILE")]
    pub file: Option<PathBuf>,

    /// Tracing filter, overridden by RUST_LOG
    #[arg(long, env = "DHT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl CliConfig {
    pub fn consistency(&self) -> Consistency {
        if self.linear {
            Consistency::Linearizable
        } else {
            Consistency::Eventual
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            nodes: self.nodes,
            replication_factor: self.replication_factor,
            consistency: self.consistency(),
            host: self.host,
            base_port: self.base_port,
            partitioner: self.partitioner,
            client_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    /// Starts the ring and drives it until the input ends or `q`.
    pub fn run(self) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(crate::driver::run(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cluster_defaults() {
        let config = CliConfig::parse_from(["chord-dht"]);
        let cluster = config.cluster_config();
        assert_eq!(cluster, ClusterConfig::default());
        assert!(config.file.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = CliConfig::parse_from([
            "chord-dht",
            "--nodes",
            "10",
            "--replication",
            "2",
            "--linear",
            "--partitioner",
            "blake3",
            "--file",
            "insert.txt",
        ]);
        let cluster = config.cluster_config();
        assert_eq!(cluster.nodes, 10);
        assert_eq!(cluster.replication_factor, 2);
        assert_eq!(cluster.consistency, Consistency::Linearizable);
        assert_eq!(cluster.partitioner, PartitionerKind::Blake3);
        assert_eq!(config.file, Some(PathBuf::from("insert.txt")));
    }
}
