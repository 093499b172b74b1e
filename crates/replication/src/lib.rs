//! Request routing and replication for the chord ring.
//!
//! This crate drives the ring at runtime:
//! - Request routers implementing eventual and linearizable replication
//! - Join and depart with key migration
//! - Per-node services, the cluster harness and a request client

pub mod client;
pub mod cluster;
pub mod error;
pub mod membership;
pub mod ring;
pub mod service;
pub mod strategy;

pub use client::{Client, Reply};
pub use cluster::{Cluster, ClusterConfig};
pub use error::{ReplicationError, Result};
pub use ring::RingContext;
pub use service::NodeService;
pub use strategy::{router_for, EventualRouter, LinearRouter, RequestRouter, RouterContext};
