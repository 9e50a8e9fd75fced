//! Test harness: spins up a real server on ephemeral endpoints and drives it
//! with real client sessions, so integration tests exercise the same code
//! paths a production deployment would.

use std::net::SocketAddr;

use server::{Supervisor, ServerSpec};
use store_client::{IpcClientSession, RpcClientSession};

/// A running server bound to an ephemeral Unix socket and TCP port, torn
/// down when dropped (best-effort; prefer calling [`TestServer::stop`]
/// for a graceful shutdown before the test ends).
pub struct TestServer {
    supervisor: Supervisor,
    ipc_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a server with a fresh temp-dir Unix socket and an OS-assigned
    /// TCP port. Waits until the backend (metadata + bulk store) is ready
    /// before returning.
    pub async fn start() -> Self {
        let ipc_dir = tempfile::tempdir().expect("create temp dir for ipc socket");
        let ipc_socket = ipc_dir.path().join("store.sock");
        let spec = ServerSpec {
            deployment: server::config::Deployment::Local,
            ipc_socket,
            rpc_endpoint: "127.0.0.1:0".parse().unwrap(),
            size: 64 << 20,
            metadata: serde_json::Value::Null,
        };
        let supervisor = Supervisor::start(spec).await.expect("test server starts");

        let mut readiness = supervisor.readiness();
        while *readiness.borrow() != server::readiness::ReadinessState::Ready {
            readiness.changed().await.expect("readiness channel stays open");
        }

        TestServer { supervisor, ipc_dir }
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.supervisor.rpc_local_addr()
    }

    pub fn ipc_socket_path(&self) -> std::path::PathBuf {
        self.supervisor.ipc_socket_path().clone()
    }

    /// Connect a synchronous client over the Unix-domain IPC endpoint.
    ///
    /// `connect_ipc` is blocking std I/O, so it runs on a blocking thread
    /// to avoid starving the test's tokio runtime.
    pub async fn connect_ipc(&self) -> IpcClientSession {
        let path = self.ipc_socket_path();
        tokio::task::spawn_blocking(move || {
            IpcClientSession::connect_ipc(&path).expect("ipc client connects")
        })
        .await
        .expect("spawn_blocking join")
    }

    /// Connect a synchronous client over the TCP RPC endpoint.
    pub async fn connect_rpc(&self) -> RpcClientSession {
        let addr = self.rpc_addr();
        tokio::task::spawn_blocking(move || {
            RpcClientSession::connect_rpc(addr).expect("rpc client connects")
        })
        .await
        .expect("spawn_blocking join")
    }

    /// Graceful shutdown: aborts accept loops, drains the dispatcher, and
    /// removes the ipc socket file. The backing temp dir is removed when
    /// `self` is dropped.
    pub async fn stop(mut self) {
        self.supervisor.stop().await;
        let _ = self.ipc_dir;
    }
}
