//! Pool identity and per-entry bookkeeping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::sandbox::{container_name, Sandbox};

/// Identity of a pooled sandbox: one per agent session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SandboxKey {
    /// Owning agent.
    pub agent_name: String,
    /// Session within the agent.
    pub session_id: String,
}

impl SandboxKey {
    /// Key for one agent session.
    pub fn new(agent_name: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            session_id: session_id.into(),
        }
    }

    /// The container this key always maps to.
    pub fn container_name(&self) -> String {
        container_name(&self.agent_name, &self.session_id)
    }
}

impl std::fmt::Display for SandboxKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.agent_name, self.session_id)
    }
}

/// Which pool tier an entry currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Counted against capacity.
    Active,
    /// Soft-evicted: container still alive, awaiting revival or idle reclamation.
    Evicted,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Evicted => write!(f, "evicted"),
        }
    }
}

/// A pooled sandbox with its LRU and idle bookkeeping.
#[derive(Debug)]
pub(crate) struct PoolEntry {
    pub(crate) sandbox: Sandbox,
    agent_name: String,
    session_id: String,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    /// Monotonic twin of `last_accessed_at`, used for idle age.
    last_touch: Instant,
    access_count: u64,
}

impl PoolEntry {
    pub(crate) fn new(key: &SandboxKey, sandbox: Sandbox) -> Self {
        let now = Utc::now();
        Self {
            sandbox,
            agent_name: key.agent_name.clone(),
            session_id: key.session_id.clone(),
            created_at: now,
            last_accessed_at: now,
            last_touch: Instant::now(),
            access_count: 1,
        }
    }

    /// Record an access.
    pub(crate) fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
        self.last_touch = Instant::now();
        self.access_count += 1;
    }

    /// Time since the last access.
    pub(crate) fn idle_for(&self) -> Duration {
        self.last_touch.elapsed()
    }

    /// True once the entry has gone strictly longer than `timeout` without access.
    pub(crate) fn is_idle(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    pub(crate) fn info(&self, tier: Tier) -> PoolEntryInfo {
        PoolEntryInfo {
            agent_name: self.agent_name.clone(),
            session_id: self.session_id.clone(),
            container_name: self.sandbox.container_name().to_string(),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            idle_seconds: self.idle_for().as_secs_f64(),
            access_count: self.access_count,
            tier,
        }
    }
}

/// Point-in-time view of one pool entry, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct PoolEntryInfo {
    /// Owning agent.
    pub agent_name: String,
    /// Session within the agent.
    pub session_id: String,
    /// Backing container.
    pub container_name: String,
    /// When the entry was admitted.
    pub created_at: DateTime<Utc>,
    /// Last get or mark.
    pub last_accessed_at: DateTime<Utc>,
    /// Seconds since the last access.
    pub idle_seconds: f64,
    /// Gets and marks since admission, counting the admission itself.
    pub access_count: u64,
    /// Tier at snapshot time.
    pub tier: Tier,
}
