//! Synchronous client session for talking to one object store instance
//! over its Unix-domain IPC endpoint or TCP RPC endpoint (spec §4.2).

mod session;
mod transport;

pub use session::{ClientSession, IpcClientSession, RpcClientSession};
pub use transport::Transport;
