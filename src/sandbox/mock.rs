//! In-memory container runtime for testing.
//!
//! Simulates daemon state for pool and sandbox tests without Docker and
//! records every call for assertions.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::error::{Result, SandboxError};
use super::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus, ExecOutput};

/// A daemon call observed by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Run(String),
    Start(String),
    Exec(String, Vec<String>),
    Stop(String),
    Remove(String),
    Inspect(String),
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, ContainerStatus>,
    specs: HashMap<String, ContainerSpec>,
    calls: Vec<Call>,
    failing_stop: HashSet<String>,
    failing_remove: HashSet<String>,
    reject_run: bool,
    exec_output: ExecOutput,
    exec_delay: Option<Duration>,
    run_delay: Option<Duration>,
    stop_delay: Option<Duration>,
}

/// A fake daemon that tracks container state and every call made to it.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pretend a container already exists at the daemon.
    pub fn seed(&self, name: &str, status: ContainerStatus) {
        self.lock().containers.insert(name.to_string(), status);
    }

    /// Simulate the keep-alive process exiting.
    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        let mut state = self.lock();
        if status == ContainerStatus::Absent {
            state.containers.remove(name);
        } else {
            state.containers.insert(name.to_string(), status);
        }
    }

    pub fn status(&self, name: &str) -> ContainerStatus {
        self.lock()
            .containers
            .get(name)
            .copied()
            .unwrap_or(ContainerStatus::Absent)
    }

    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.lock().specs.get(name).cloned()
    }

    pub fn fail_stop(&self, name: &str) {
        self.lock().failing_stop.insert(name.to_string());
    }

    pub fn fail_remove(&self, name: &str) {
        self.lock().failing_remove.insert(name.to_string());
    }

    /// Undo [`fail_remove`](Self::fail_remove).
    pub fn allow_remove(&self, name: &str) {
        self.lock().failing_remove.remove(name);
    }

    pub fn reject_run(&self) {
        self.lock().reject_run = true;
    }

    pub fn set_exec_output(&self, output: ExecOutput) {
        self.lock().exec_output = output;
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.lock().exec_delay = Some(delay);
    }

    pub fn set_run_delay(&self, delay: Duration) {
        self.lock().run_delay = Some(delay);
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        self.lock().stop_delay = Some(delay);
    }

    /// Number of `run` calls for one container name.
    pub fn runs_of(&self, name: &str) -> usize {
        self.count(|c| matches!(c, Call::Run(n) if n == name))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn runs(&self) -> usize {
        self.count(|c| matches!(c, Call::Run(_)))
    }

    pub fn starts(&self) -> usize {
        self.count(|c| matches!(c, Call::Start(_)))
    }

    pub fn removes(&self) -> usize {
        self.count(|c| matches!(c, Call::Remove(_)))
    }

    /// Commands passed to `exec`, in order.
    pub fn exec_commands(&self) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Exec(_, cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<()> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(Call::Run(spec.name.clone()));
            if state.reject_run {
                return Err(SandboxError::provisioning(&spec.name, "image not found"));
            }
            state.run_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.containers.contains_key(&spec.name) {
            return Err(SandboxError::provisioning(
                &spec.name,
                "container name already in use",
            ));
        }
        state
            .containers
            .insert(spec.name.clone(), ContainerStatus::Running);
        state.specs.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Start(name.to_string()));
        match state.containers.get_mut(name) {
            Some(status) => {
                *status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(SandboxError::not_found(name)),
        }
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        let (delay, output) = {
            let mut state = self.lock();
            state
                .calls
                .push(Call::Exec(name.to_string(), command.to_vec()));
            match state.containers.get(name) {
                Some(ContainerStatus::Running) => {}
                Some(_) => {
                    return Err(SandboxError::exec(name, "container is not running"));
                }
                None => return Err(SandboxError::not_found(name)),
            }
            (state.exec_delay, state.exec_output.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(output)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(Call::Stop(name.to_string()));
            state.stop_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.failing_stop.contains(name) {
            return Err(SandboxError::cleanup(name, "stop refused"));
        }
        match state.containers.get_mut(name) {
            Some(status) => {
                *status = ContainerStatus::Stopped;
                Ok(())
            }
            None => Err(SandboxError::not_found(name)),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Remove(name.to_string()));
        if state.failing_remove.contains(name) {
            return Err(SandboxError::cleanup(name, "remove refused"));
        }
        match state.containers.remove(name) {
            Some(_) => Ok(()),
            None => Err(SandboxError::not_found(name)),
        }
    }

    async fn inspect(&self, name: &str) -> Result<ContainerStatus> {
        let mut state = self.lock();
        state.calls.push(Call::Inspect(name.to_string()));
        Ok(state
            .containers
            .get(name)
            .copied()
            .unwrap_or(ContainerStatus::Absent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "alpine".to_string(),
            work_dir: "/workspace".to_string(),
            binds: Vec::new(),
            read_only_rootfs: false,
            network_disabled: false,
            user: None,
            command: None,
        }
    }

    #[tokio::test]
    async fn test_mock_run_then_inspect() {
        let runtime = MockRuntime::new();
        assert_eq!(runtime.inspect("c1").await.unwrap(), ContainerStatus::Absent);

        runtime.run(&spec("c1")).await.unwrap();
        assert_eq!(runtime.inspect("c1").await.unwrap(), ContainerStatus::Running);
        assert_eq!(runtime.runs(), 1);
    }

    #[tokio::test]
    async fn test_mock_rejects_duplicate_name() {
        let runtime = MockRuntime::new();
        runtime.run(&spec("c1")).await.unwrap();
        let err = runtime.run(&spec("c1")).await.unwrap_err();
        assert!(err.is_provisioning());
    }

    #[tokio::test]
    async fn test_mock_exec_requires_running() {
        let runtime = MockRuntime::new();
        runtime.seed("c1", ContainerStatus::Stopped);
        assert!(runtime.exec("c1", &[]).await.is_err());
        assert!(runtime.exec("missing", &[]).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let runtime = MockRuntime::new();
        runtime.seed("c1", ContainerStatus::Running);
        runtime.fail_stop("c1");
        runtime.fail_remove("c1");
        assert!(runtime.stop("c1").await.unwrap_err().is_cleanup());
        assert!(runtime.remove("c1").await.unwrap_err().is_cleanup());
        assert_eq!(runtime.status("c1"), ContainerStatus::Running);

        runtime.allow_remove("c1");
        runtime.remove("c1").await.unwrap();
        assert_eq!(runtime.status("c1"), ContainerStatus::Absent);
    }
}
