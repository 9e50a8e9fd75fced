//! Lifecycle supervisor (spec §4.6).
//!
//! Starts the metadata façade and bulk store in-process (they have no
//! external dependency to wait on in this implementation), then the IPC and
//! RPC accept loops, in that order. A failed start aborts the sequence and
//! tears down whatever already started, in reverse. `stop` is idempotent:
//! only the first caller drives the shutdown side effects.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerSpec;
use crate::connection;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::readiness::{ReadinessCoordinator, Subsystems};
use crate::ServerError;

/// Handle returned by [`Supervisor::start`]. Dropping it does not stop the
/// server; call [`Supervisor::stop`] for an orderly shutdown.
pub struct Supervisor {
    dispatcher_cmd_tx: mpsc::Sender<DispatchRequest>,
    dispatcher_stop_tx: Option<oneshot::Sender<()>>,
    dispatcher_task: JoinHandle<()>,
    ipc_task: Option<JoinHandle<()>>,
    rpc_task: Option<JoinHandle<()>>,
    ipc_socket: PathBuf,
    rpc_addr: SocketAddr,
    stopped: Arc<AtomicBool>,
    readiness: ReadinessCoordinator,
}

impl Supervisor {
    pub async fn start(spec: ServerSpec) -> Result<Self, ServerError> {
        let (mut readiness, readiness_rx) = ReadinessCoordinator::new();

        // Metadata façade: in-process, always available once constructed.
        readiness.signal(Subsystems::META);
        info!("metadata facade ready");

        // Bulk store: in-process, capacity is validated up front.
        let bulk_capacity = spec.size;
        readiness.signal(Subsystems::BULK);
        info!(capacity = bulk_capacity, "bulk store ready");

        let instance_id = store_core::InstanceID(1);
        let dispatcher = Dispatcher::new(instance_id, bulk_capacity, readiness_rx);
        let (cmd_tx, cmd_rx) = mpsc::channel(1024);
        let (stop_tx, stop_rx) = oneshot::channel();
        let dispatcher_task = tokio::spawn(dispatcher.run(cmd_rx, stop_rx));

        let ipc_listener = match UnixListener::bind(&spec.ipc_socket) {
            Ok(l) => l,
            Err(source) => {
                dispatcher_task.abort();
                return Err(ServerError::SubsystemStart {
                    subsystem: "ipc",
                    source,
                });
            }
        };
        info!(path = %spec.ipc_socket.display(), "ipc endpoint bound");

        let rpc_listener = match TcpListener::bind(spec.rpc_endpoint).await {
            Ok(l) => l,
            Err(source) => {
                dispatcher_task.abort();
                drop(ipc_listener);
                let _ = std::fs::remove_file(&spec.ipc_socket);
                return Err(ServerError::SubsystemStart {
                    subsystem: "rpc",
                    source,
                });
            }
        };
        let rpc_addr = rpc_listener
            .local_addr()
            .unwrap_or(spec.rpc_endpoint);
        info!(addr = %rpc_addr, "rpc endpoint bound");

        readiness.signal(Subsystems::IPC);
        readiness.signal(Subsystems::RPC);
        info!("all subsystems up");

        let ipc_tx = cmd_tx.clone();
        let ipc_task = tokio::spawn(accept_ipc(ipc_listener, ipc_tx));
        let rpc_tx = cmd_tx.clone();
        let rpc_task = tokio::spawn(accept_rpc(rpc_listener, rpc_tx));

        Ok(Supervisor {
            dispatcher_cmd_tx: cmd_tx,
            dispatcher_stop_tx: Some(stop_tx),
            dispatcher_task,
            ipc_task: Some(ipc_task),
            rpc_task: Some(rpc_task),
            ipc_socket: spec.ipc_socket,
            rpc_addr,
            stopped: Arc::new(AtomicBool::new(false)),
            readiness,
        })
    }

    pub fn readiness(&self) -> tokio::sync::watch::Receiver<crate::readiness::ReadinessState> {
        self.readiness.subscribe()
    }

    pub fn dispatcher_sender(&self) -> mpsc::Sender<DispatchRequest> {
        self.dispatcher_cmd_tx.clone()
    }

    /// The `rpc_endpoint` the listener actually bound to. Differs from the
    /// spec's value when the spec requested an ephemeral port (`:0`).
    pub fn rpc_local_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn ipc_socket_path(&self) -> &PathBuf {
        &self.ipc_socket
    }

    /// Idempotent: only the first caller aborts the accept loops, signals
    /// the dispatcher to stop (it drops transient metadata for this
    /// instance and drains the deferred queue with `cancelled` replies
    /// before returning), and joins its task. Signalling rather than
    /// relying on every `DispatchRequest` sender dropping matters because a
    /// connection task with a request still in flight holds its own sender
    /// clone alive for as long as it runs.
    pub async fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("stopping server");
        self.readiness.begin_stop();
        if let Some(task) = self.rpc_task.take() {
            task.abort();
        }
        if let Some(task) = self.ipc_task.take() {
            task.abort();
        }
        if let Some(stop_tx) = self.dispatcher_stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let _ = (&mut self.dispatcher_task).await;
        self.readiness.finish_stop();
        if let Err(e) = std::fs::remove_file(&self.ipc_socket) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "failed to remove ipc socket file on shutdown");
            }
        }
    }
}

async fn accept_ipc(listener: UnixListener, cmd_tx: mpsc::Sender<DispatchRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let cmd_tx = cmd_tx.clone();
                tokio::spawn(async move { connection::serve(stream, cmd_tx).await });
            }
            Err(e) => {
                warn!(error = %e, "ipc accept failed");
                break;
            }
        }
    }
}

async fn accept_rpc(listener: TcpListener, cmd_tx: mpsc::Sender<DispatchRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                accept_one_rpc(stream, addr, cmd_tx.clone());
            }
            Err(e) => {
                warn!(error = %e, "rpc accept failed");
                break;
            }
        }
    }
}

fn accept_one_rpc(stream: tokio::net::TcpStream, addr: SocketAddr, cmd_tx: mpsc::Sender<DispatchRequest>) {
    info!(%addr, "rpc connection accepted");
    tokio::spawn(async move { connection::serve(stream, cmd_tx).await });
}
