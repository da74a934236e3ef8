//! Approval-gated shell commands.
//!
//! A command is first registered as a pending request; it only runs once the
//! caller approves it by id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to start shell: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRequest {
    pub id: String,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug)]
struct PendingRequest {
    request: TerminalRequest,
    registered: Instant,
}

#[derive(Debug)]
pub struct TerminalRegistry {
    ttl: Duration,
    exec_timeout: Duration,
    working_dir: Option<PathBuf>,
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl Default for TerminalRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TTL)
    }
}

impl TerminalRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            working_dir: None,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn create(&self, command: impl Into<String>) -> TerminalRequest {
        let request = TerminalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.into(),
            created_at: Utc::now(),
        };
        let mut pending = self.lock();
        purge_expired(&mut pending, self.ttl);
        pending.insert(
            request.id.clone(),
            PendingRequest {
                request: request.clone(),
                registered: Instant::now(),
            },
        );
        tracing::info!(request_id = %request.id, command = %request.command, "terminal command awaiting approval");
        request
    }

    pub fn get(&self, id: &str) -> Option<TerminalRequest> {
        let mut pending = self.lock();
        purge_expired(&mut pending, self.ttl);
        pending.get(id).map(|entry| entry.request.clone())
    }

    /// Remove and return a live request.
    pub fn take(&self, id: &str) -> Option<TerminalRequest> {
        let mut pending = self.lock();
        purge_expired(&mut pending, self.ttl);
        pending.remove(id).map(|entry| entry.request)
    }

    pub fn len(&self) -> usize {
        let mut pending = self.lock();
        purge_expired(&mut pending, self.ttl);
        pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn execute(&self, request: &TerminalRequest) -> Result<CommandOutput, TerminalError> {
        tracing::info!(request_id = %request.id, "running approved terminal command");
        run_shell(
            &request.command,
            self.working_dir.as_ref(),
            self.exec_timeout,
        )
        .await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn purge_expired(pending: &mut HashMap<String, PendingRequest>, ttl: Duration) {
    pending.retain(|_, entry| entry.registered.elapsed() < ttl);
}

/// Run `sh -c <command>`. A non-zero exit is a normal result.
pub async fn run_shell(
    command: &str,
    working_dir: Option<&PathBuf>,
    timeout: Duration,
) -> Result<CommandOutput, TerminalError> {
    let mut shell = tokio::process::Command::new("sh");
    shell.arg("-c").arg(command).kill_on_drop(true);
    if let Some(dir) = working_dir {
        shell.current_dir(dir);
    }

    match tokio::time::timeout(timeout, shell.output()).await {
        Ok(output) => {
            let output = output?;
            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            })
        }
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "terminal command timed out");
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("command timed out after {timeout:?}"),
                exit_code: -1,
            })
        }
    }
}
