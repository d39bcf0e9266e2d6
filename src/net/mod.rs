//! Networking: framing, cipher, command protocol and connection actors

pub mod cipher;
pub mod connection;
pub mod dispatch;
pub mod framing;
pub mod limits;
pub mod payloads;
pub mod protocol;
pub mod socket;
pub mod transport;

pub use connection::{run_connection, SocketRegistry};
pub use protocol::{Command, CommandName, CommandSide};
pub use socket::{Screen, UserSocket};
pub use transport::GameServer;
