//! Background task execution
//!
//! Every remote operation runs as its own task. The control loop never
//! awaits network or disk I/O directly.

use std::future::Future;
use std::pin::Pin;

use tracing::trace;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs fire-and-forget work off the control loop
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, name: &'static str, task: BoxFuture);
}

/// Spawns onto the current tokio runtime
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, name: &'static str, task: BoxFuture) {
        trace!("Spawning {} task", name);
        tokio::spawn(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_tokio_spawner_runs_task() {
        let (tx, rx) = oneshot::channel();
        TokioSpawner.spawn(
            "test",
            Box::pin(async move {
                let _ = tx.send(42);
            }),
        );
        assert_eq!(rx.await.unwrap(), 42);
    }
}
