//! # Connection Supervisor
//!
//! Owns the supervision task of every connection runtime. Restart policy is
//! transient: a runtime that stops abnormally is rebuilt from the canonical
//! session state it handed back, bounded by `max_restarts` within
//! `max_seconds`; clean exits (user close, dropped handles) are final. The
//! stable id is re-registered to the new runtime before the old mailbox is
//! discarded, so callers never observe the restart.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::registry::ConnectionRegistry;
use crate::codec::FrameCodec;
use crate::limiter::RateLimitError;
use crate::runtime::{ConnectionRuntime, RunExit, RuntimeConfig};
use crate::session::{ClientConn, ConnectionId};

/// Restart budget for one connection.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Maximum abnormal restarts within the window.
    pub max_restarts: u32,
    /// Window length in seconds.
    pub max_seconds: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            max_seconds: 5,
        }
    }
}

/// # Connection Supervisor
///
/// Spawns one supervision task per connection; each task runs the runtime,
/// applies the restart policy on exit, and keeps the registry current.
pub struct ConnectionSupervisor {
    registry: Arc<ConnectionRegistry>,
    config: SupervisorConfig,
    shutdown: CancellationToken,
}

impl Default for ConnectionSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl ConnectionSupervisor {
    /// A supervisor with its own registry.
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// The shared registry.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Builds, registers and supervises a runtime for the given session.
    /// The id is registered before the runtime task starts, so commands sent
    /// immediately after this returns are accepted.
    pub fn start_connection(
        &self,
        conn: ClientConn,
        codec: FrameCodec,
        runtime_config: RuntimeConfig,
    ) -> Result<ConnectionId, RateLimitError> {
        let id = conn.id.clone();
        let (runtime, handle) = ConnectionRuntime::new(conn, codec.clone(), runtime_config.clone())?;
        self.registry.register(id.clone(), handle);

        let registry = Arc::clone(&self.registry);
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        let supervised_id = id.clone();
        tokio::spawn(async move {
            supervise(
                supervised_id,
                runtime,
                codec,
                runtime_config,
                registry,
                config,
                shutdown,
            )
            .await;
        });
        Ok(id)
    }

    /// Closes every registered connection cleanly and stops further
    /// restarts.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for id in self.registry.ids() {
            if let Some(handle) = self.registry.lookup(&id) {
                if let Err(err) = handle.close(Duration::from_secs(5)).await {
                    log::warn!("shutdown: closing {} failed: {}", id, err);
                }
            }
        }
    }
}

async fn supervise(
    id: ConnectionId,
    runtime: ConnectionRuntime,
    codec: FrameCodec,
    runtime_config: RuntimeConfig,
    registry: Arc<ConnectionRegistry>,
    config: SupervisorConfig,
    shutdown: CancellationToken,
) {
    let mut restarts: VecDeque<Instant> = VecDeque::new();
    let mut current = runtime;
    loop {
        let outcome = tokio::spawn(current.run()).await;
        match outcome {
            Ok((RunExit::Clean, _conn)) => {
                registry.deregister(&id);
                return;
            }
            Ok((RunExit::Stopped { reason }, conn)) => {
                if shutdown.is_cancelled() {
                    registry.deregister(&id);
                    return;
                }
                let window = Duration::from_secs(config.max_seconds);
                while restarts
                    .front()
                    .is_some_and(|at| at.elapsed() > window)
                {
                    restarts.pop_front();
                }
                if restarts.len() >= config.max_restarts as usize {
                    log::error!(
                        "{}: restart budget exhausted ({} in {}s), giving up after: {}",
                        id,
                        config.max_restarts,
                        config.max_seconds,
                        reason
                    );
                    registry.deregister(&id);
                    return;
                }
                restarts.push_back(Instant::now());
                log::warn!("{}: runtime stopped ({}), restarting", id, reason);
                match ConnectionRuntime::new(conn, codec.clone(), runtime_config.clone()) {
                    Ok((runtime, handle)) => {
                        // Re-register before the new runtime accepts anything.
                        registry.register(id.clone(), handle);
                        current = runtime;
                    }
                    Err(err) => {
                        log::error!("{}: rebuild failed: {}", id, err);
                        registry.deregister(&id);
                        return;
                    }
                }
            }
            Err(join_err) => {
                // A panic loses the canonical state; nothing to rebuild from.
                log::error!("{}: runtime task died: {}", id, join_err);
                registry.deregister(&id);
                return;
            }
        }
    }
}
