use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use intake_events::{EventBus, HandlerRegistry, Routable, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Queue-consuming loop that feeds bus messages to a handler registry.
///
/// - Subscribes before the thread starts, so nothing published afterwards is missed
/// - Handlers must be idempotent (at-least-once delivery)
/// - Handler failures are logged and the loop moves on; redelivery is the
///   transport's job
#[derive(Debug)]
pub struct EventWorker;

impl EventWorker {
    /// Spawn a named worker thread.
    ///
    /// `poll_interval` bounds how long a shutdown request waits for the loop
    /// to notice it.
    pub fn spawn<M, B, E>(
        name: &'static str,
        bus: &B,
        registry: HandlerRegistry<M, E>,
        poll_interval: Duration,
    ) -> std::io::Result<WorkerHandle>
    where
        M: Routable + Send + 'static,
        B: EventBus<M>,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &registry, poll_interval))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    registry: &HandlerRegistry<M, E>,
    tick: Duration,
) where
    M: Routable,
    E: core::fmt::Debug,
{
    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => match registry.dispatch(&msg) {
                Ok(handled) => {
                    debug!(worker = name, event_type = msg.route_key(), handled, "event dispatched");
                }
                Err(err) => {
                    warn!(worker = name, event_type = msg.route_key(), error = ?err, "event handler failed");
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "worker stopped");
}
