//! Bounded pool of per-session Docker sandboxes.
//!
//! Callers ask a [`SandboxPool`] for the sandbox of an `(agent, session)`
//! pair and get back a [`Sandbox`] bound to a container whose name is
//! derived from that pair. The pool keeps at most `capacity` sandboxes
//! active, soft-evicts the least recently used ones without stopping their
//! containers, and relies on a [`Reaper`] to destroy evicted sandboxes that
//! stay idle. A [`PoolService`] exposes a pool over line-delimited JSON.
//!
//! ```ignore
//! use std::sync::Arc;
//! use sandpool::{DockerRuntime, SandboxConfig, SandboxKey, SandboxPool};
//!
//! let runtime = DockerRuntime::connect(&Default::default()).await?;
//! let pool = SandboxPool::new(Arc::new(runtime), 10)?;
//!
//! let key = SandboxKey::new("kubent", "42");
//! let config = SandboxConfig::new("kubent", "42", "python:3.12");
//! let sandbox = pool.get_sandbox(&key, Some(&config)).await?;
//! let output = sandbox.bash("python --version").await?;
//! ```

/// `sandpool.toml` loading.
pub mod config;
/// Two-tier sandbox pool and its reaper.
pub mod pool;
/// Containers and the sandbox facade over them.
pub mod sandbox;
/// Line-delimited JSON front end for a pool.
pub mod service;

pub use pool::{PoolEntryInfo, Reaper, ReaperConfig, SandboxKey, SandboxPool, Tier};
pub use sandbox::{
    ContainerHandle, ContainerRuntime, ContainerStatus, DockerRuntime, ExecOutput, Sandbox,
    SandboxConfig, SandboxError, VolumeMount,
};
pub use service::{PoolService, Request, Response};
