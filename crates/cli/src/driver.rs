//! Drives a local ring from stdin or a command file.

use crate::commands::{Command, CommandResult, InputFormat, HELP};
use crate::config::CliConfig;
use anyhow::Context;
use corelib::Address;
use rand::seq::SliceRandom;
use replication::{Client, Cluster, ClusterConfig};
use std::path::Path;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub struct Driver {
    cluster: Cluster,
    client: Client,
}

impl Driver {
    pub async fn start(config: ClusterConfig) -> anyhow::Result<Self> {
        let cluster = Cluster::start(config)
            .await
            .context("failed to start the ring")?;
        let client = cluster.client();
        Ok(Self { cluster, client })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Data commands enter the ring at a random live node.
    fn entry(&self) -> Address {
        let addresses = self.cluster.addresses();
        addresses
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_else(|| self.cluster.bootstrapped())
    }

    pub async fn execute(&self, command: Command) -> anyhow::Result<CommandResult> {
        let (verb, reply) = match command {
            Command::Insert { key, value } => {
                ("insert", self.client.insert(self.entry(), &key, &value).await?)
            }
            Command::Query { key } => ("query", self.client.query(self.entry(), &key).await?),
            Command::QueryAll => ("query", self.client.query_all(self.entry()).await?),
            Command::Delete { key } => ("delete", self.client.delete(self.entry(), &key).await?),
            Command::Join { serial } => {
                let entry = self.cluster.bootstrapped();
                ("join", self.client.join(entry, serial).await?)
            }
            Command::Depart { serial } => {
                self.cluster.check_departure(serial)?;
                let entry = self.cluster.bootstrapped();
                ("depart", self.client.depart(entry, serial).await?)
            }
            Command::Ring => {
                let order = self.cluster.ring_order()?;
                return Ok(CommandResult::Ring(serde_json::to_string_pretty(&order)?));
            }
            Command::Help => return Ok(CommandResult::Help),
            Command::Quit => return Ok(CommandResult::Quit),
        };
        Ok(CommandResult::Reply { verb, reply })
    }

    /// Runs every line of `path`; a failing line is reported and skipped.
    pub async fn run_file(&self, path: &Path) -> anyhow::Result<usize> {
        let format = InputFormat::for_path(path);
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let started = Instant::now();
        let mut executed = 0;
        while let Some(line) = lines.next_line().await? {
            let command = match format.parse_line(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(err) => {
                    warn!(line = %line, error = %err, "skipping line");
                    continue;
                }
            };
            match self.execute(command).await {
                Ok(CommandResult::Quit) => break,
                Ok(result) => println!("{result}"),
                Err(err) => println!("error: {err:#}"),
            }
            executed += 1;
        }

        let elapsed = started.elapsed();
        info!(
            file = %path.display(),
            commands = executed,
            elapsed_ms = elapsed.as_millis() as u64,
            "file processed"
        );
        Ok(executed)
    }

    pub async fn repl(&self) -> anyhow::Result<()> {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let command = match line.parse::<Command>() {
                Ok(command) => command,
                Err(err) => {
                    println!("error: {err}");
                    continue;
                }
            };
            match self.execute(command).await {
                Ok(CommandResult::Quit) => break,
                Ok(result) => println!("{result}"),
                Err(err) => println!("error: {err:#}"),
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cluster.shutdown();
    }
}

pub async fn run(config: CliConfig) -> anyhow::Result<()> {
    let driver = Driver::start(config.cluster_config()).await?;
    let outcome = match &config.file {
        Some(path) => driver.run_file(path).await.map(|_| ()),
        None => driver.repl().await,
    };
    driver.shutdown();
    outcome
}
