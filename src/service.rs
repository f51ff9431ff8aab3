//! Line-delimited JSON front end for a long-lived [`SandboxPool`].
//!
//! Each input line is one request object tagged by `op`; each produces
//! exactly one response line. Requests are handled in arrival order.
//!
//! ```text
//! {"id": 1, "op": "exec", "agent": "kubent", "session": "42", "command": "ls"}
//! {"id": 1, "ok": true, "output": {"stdout": "...", "stderr": "", "exit_code": 0}}
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::SandboxDefaults;
use crate::pool::{PoolEntryInfo, SandboxKey, SandboxPool};
use crate::sandbox::{ExecOutput, Sandbox};

/// One operation against the pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Run a shell command, or a file by extension when `file` is set.
    Exec {
        /// Agent name.
        agent: String,
        /// Session identifier.
        session: String,
        /// Shell command, passed to `sh -c` as-is.
        command: Option<String>,
        /// Path of a file inside the container to execute.
        file: Option<String>,
        /// Arguments for `file`.
        #[serde(default)]
        args: Vec<String>,
    },
    /// Write `content` to `path` inside the sandbox.
    WriteFile {
        /// Agent name.
        agent: String,
        /// Session identifier.
        session: String,
        /// Destination path inside the container.
        path: String,
        /// Exact file content.
        content: String,
    },
    /// Read the file at `path` inside the sandbox.
    ReadFile {
        /// Agent name.
        agent: String,
        /// Session identifier.
        session: String,
        /// Path inside the container.
        path: String,
    },
    /// Refresh an active sandbox's LRU position.
    Mark {
        /// Agent name.
        agent: String,
        /// Session identifier.
        session: String,
    },
    /// Drop a sandbox from the pool and destroy its container.
    Remove {
        /// Agent name.
        agent: String,
        /// Session identifier.
        session: String,
    },
    /// List every pooled sandbox.
    Snapshot,
    /// Destroy every evicted sandbox now.
    CleanupEvicted,
}

enum ExecTarget {
    Shell(String),
    File(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(flatten)]
    request: Request,
}

/// Reply to one request. Only the fields relevant to the operation are set.
#[derive(Debug, Default, Serialize)]
pub struct Response {
    /// Echo of the request `id`, if it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// False when the request failed; `error` then says why.
    pub ok: bool,
    /// Result of `exec`, `write_file` and `read_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ExecOutput>,
    /// Whether `remove` found the key in the pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    /// Sandboxes destroyed by `cleanup_evicted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaimed: Option<usize>,
    /// Pool contents for `snapshot`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<PoolEntryInfo>>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    fn failed(id: Option<u64>, error: String) -> Self {
        Self {
            id,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Serves [`Request`]s against a shared pool, provisioning new sessions
/// from one set of sandbox defaults.
pub struct PoolService {
    pool: Arc<SandboxPool>,
    defaults: SandboxDefaults,
}

impl PoolService {
    /// Wrap `pool`; unknown sessions are created from `defaults`.
    pub fn new(pool: Arc<SandboxPool>, defaults: SandboxDefaults) -> Self {
        Self { pool, defaults }
    }

    async fn sandbox(&self, agent: &str, session: &str) -> Result<(SandboxKey, Sandbox)> {
        let key = SandboxKey::new(agent, session);
        let config = self.defaults.for_session(agent, session)?;
        let sandbox = self.pool.get_sandbox(&key, Some(&config)).await?;
        Ok((key, sandbox))
    }

    /// Run one request.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::Exec {
                agent,
                session,
                command,
                file,
                args,
            } => {
                let target = match (file, command) {
                    (Some(path), _) => ExecTarget::File(path),
                    (None, Some(command)) => ExecTarget::Shell(command),
                    (None, None) => bail!("exec needs a command or a file"),
                };
                let (key, sandbox) = self.sandbox(&agent, &session).await?;
                let output = match target {
                    ExecTarget::File(path) => sandbox.execute_file(&path, &args).await,
                    ExecTarget::Shell(command) => sandbox.bash(&command).await,
                };
                // Idle time counts from the end of the command.
                self.pool.mark_sandbox(&key).await;
                Ok(Response {
                    output: Some(output?),
                    ..Response::ok()
                })
            }
            Request::WriteFile {
                agent,
                session,
                path,
                content,
            } => {
                let (key, sandbox) = self.sandbox(&agent, &session).await?;
                let output = sandbox.write_file(&path, &content).await;
                self.pool.mark_sandbox(&key).await;
                Ok(Response {
                    output: Some(output?),
                    ..Response::ok()
                })
            }
            Request::ReadFile {
                agent,
                session,
                path,
            } => {
                let (key, sandbox) = self.sandbox(&agent, &session).await?;
                let output = sandbox.read_file(&path).await;
                self.pool.mark_sandbox(&key).await;
                Ok(Response {
                    output: Some(output?),
                    ..Response::ok()
                })
            }
            Request::Mark { agent, session } => {
                self.pool
                    .mark_sandbox(&SandboxKey::new(agent, session))
                    .await;
                Ok(Response::ok())
            }
            Request::Remove { agent, session } => {
                let removed = self
                    .pool
                    .remove_sandbox(&SandboxKey::new(agent, session))
                    .await;
                Ok(Response {
                    removed: Some(removed),
                    ..Response::ok()
                })
            }
            Request::Snapshot => Ok(Response {
                entries: Some(self.pool.snapshot().await),
                ..Response::ok()
            }),
            Request::CleanupEvicted => Ok(Response {
                reclaimed: Some(self.pool.cleanup_all_evicted().await),
                ..Response::ok()
            }),
        }
    }

    /// Parse and run one input line. Never fails: errors become responses.
    pub async fn handle_line(&self, line: &str) -> Response {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Rejected malformed request");
                return Response::failed(None, format!("invalid request: {e}"));
            }
        };

        debug!(id = ?envelope.id, request = ?envelope.request, "Handling request");
        match self.handle(envelope.request).await {
            Ok(response) => Response {
                id: envelope.id,
                ..response
            },
            Err(e) => Response::failed(envelope.id, format!("{e:#}")),
        }
    }

    /// Answer every line of `reader` on `writer` until end of input.
    ///
    /// Blank lines are skipped. Returns the number of requests handled.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            let mut json = serde_json::to_string(&response)?;
            json.push('\n');
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await?;
            handled += 1;
        }

        Ok(handled)
    }
}
