//! Live log following for several services at once.
//!
//! One worker per service shares a single cancellation token. The supervisor
//! cancels every worker on shutdown and joins all of them before returning.

use std::collections::BTreeMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use barops_cloud::{command, CloudError, YandexCloud};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A stream of log lines for one service.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Follow logs until the stream ends or `cancel` fires.
    async fn follow(&self, service: &str, cancel: CancellationToken) -> Result<(), CloudError>;
}

/// Follows serverless container logs through `yc logging read --follow`.
pub struct YcLogSource {
    cloud: YandexCloud,
    /// Container id per service name.
    containers: BTreeMap<String, String>,
}

impl YcLogSource {
    #[must_use]
    pub fn new(cloud: YandexCloud, containers: BTreeMap<String, String>) -> Self {
        Self { cloud, containers }
    }
}

#[async_trait]
impl LogSource for YcLogSource {
    async fn follow(&self, service: &str, cancel: CancellationToken) -> Result<(), CloudError> {
        let container_id = self
            .containers
            .get(service)
            .ok_or_else(|| CloudError::NotFound(format!("container of {service}")))?;

        let mut cmd = self.cloud.logs_command(container_id);
        let line = command::describe(&cmd);
        debug!(command = %line, "Following logs");
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CloudError::Spawn {
                program: "yc".into(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Ok(());
        };
        let mut lines = BufReader::new(stdout).lines();
        let prefix = format!("[{service}]").cyan();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        debug!("Failed to kill log follower for {service}: {e}");
                    }
                    return Ok(());
                }
                next = lines.next_line() => match next {
                    Ok(Some(text)) => println!("{prefix} {text}"),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Log stream of {service} failed: {e}");
                        break;
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|source| CloudError::Spawn {
            program: "yc".into(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(CloudError::Command {
                command: line,
                status: status.code().unwrap_or(-1),
                stderr: String::new(),
            })
        }
    }
}

/// Owns the log workers and their shared cancellation token.
pub struct LogSupervisor {
    cancel: CancellationToken,
    workers: JoinSet<(String, Result<(), CloudError>)>,
}

impl Default for LogSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            workers: JoinSet::new(),
        }
    }

    /// Token shared by every worker.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start following one service.
    pub fn spawn(&mut self, service: &str, source: Arc<dyn LogSource>) {
        let service = service.to_string();
        let cancel = self.cancel.child_token();
        self.workers.spawn(async move {
            let result = source.follow(&service, cancel).await;
            (service, result)
        });
    }

    /// Number of running workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for `shutdown` or for every worker to finish on its own, then
    /// cancel and join all workers. Returns how many workers were joined.
    pub async fn run_until<F>(mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut joined = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                next = self.workers.join_next() => match next {
                    Some(result) => {
                        joined += 1;
                        report(result);
                    }
                    None => return joined,
                }
            }
        }

        self.cancel.cancel();
        while let Some(result) = self.workers.join_next().await {
            joined += 1;
            report(result);
        }
        joined
    }
}

fn report(result: Result<(String, Result<(), CloudError>), tokio::task::JoinError>) {
    match result {
        Ok((service, Ok(()))) => debug!("Log follower for {service} stopped"),
        Ok((service, Err(e))) => warn!("Log follower for {service} failed: {e}"),
        Err(e) => warn!("Log follower task panicked: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct UntilCancelled {
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LogSource for UntilCancelled {
        async fn follow(&self, _service: &str, cancel: CancellationToken) -> Result<(), CloudError> {
            cancel.cancelled().await;
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_joins_every_worker() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let source: Arc<dyn LogSource> = Arc::new(UntilCancelled {
            stopped: Arc::clone(&stopped),
        });

        let mut supervisor = LogSupervisor::new();
        for service in ["gateway", "rag", "telegram"] {
            supervisor.spawn(service, Arc::clone(&source));
        }
        assert_eq!(supervisor.len(), 3);

        let joined = supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;

        assert_eq!(joined, 3);
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    struct Finishes;

    #[async_trait]
    impl LogSource for Finishes {
        async fn follow(&self, service: &str, _cancel: CancellationToken) -> Result<(), CloudError> {
            if service == "rag" {
                Err(CloudError::NotFound("container of rag".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_workers_ending_on_their_own_return_early() {
        let mut supervisor = LogSupervisor::new();
        let source: Arc<dyn LogSource> = Arc::new(Finishes);
        supervisor.spawn("gateway", Arc::clone(&source));
        supervisor.spawn("rag", source);

        let joined = supervisor.run_until(std::future::pending()).await;
        assert_eq!(joined, 2);
    }
}
