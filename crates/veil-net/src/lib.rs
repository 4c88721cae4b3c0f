// Transport seams for the Veil client: the HTTP file sub-protocol and the
// supervised JSON message channel.

pub mod connection;
pub mod error;
pub mod memory;
pub mod supervisor;
pub mod transport;

pub use connection::{Connection, Connector};
pub use error::TransportError;
pub use memory::{MemoryConnector, MemoryFileTransport, ServerSide};
pub use supervisor::{spawn_connection, ConnectionCommand, ConnectionNotification, SupervisorHandle};
pub use transport::{ByteStream, FileTransport, HttpFileTransport};
