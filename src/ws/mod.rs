//! WebSocket channel fabric: protocol, registry, routing and rate limits.

pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod router;

pub use protocol::{ClientMessage, DeviceType, ServerMessage};
pub use rate_limit::{ConnectionLimits, LimitVerdict, TokenBucket};
pub use registry::{ConnectionRegistry, Outbound, Peer};
pub use router::{RouterDeps, serve_socket};
