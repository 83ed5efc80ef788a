//! murmur-services: the node's shared state and protocol logic.
//!
//! The daemon wires these together; the HTTP surface reads the registry,
//! queue, and inbox directly.

pub mod broadcast;
pub mod inbox;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;

pub use broadcast::{Broadcaster, FanOutReport, Heartbeat, QueueDrain, SendError};
pub use inbox::{Inbox, ReceivedMessage};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use queue::{EnqueueError, OutboundQueue};
pub use registry::{unix_secs, PeerRecord, PeerRegistry};
pub use session::{run_session, Session, SessionContext, SessionEvent, SessionState};
pub use transport::{BoxedStream, ByteStream, InboundStream, Transport, TransportError};
