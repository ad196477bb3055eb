/// Webhook Relay Channel
///
/// Bridges webhook nodes to an external relay process over a long-lived
/// duplex connection carrying newline-delimited JSON.

// Connection lifecycle, dispatch and request correlation
pub mod channel;

// Newline framing tolerant of unreadable lines
pub mod codec;

// Typed relay failures
pub mod error;

// NodeExecutor adapter for webhook nodes
pub mod executor;

// Wire messages and registration payloads
pub mod protocol;

// Connectors producing byte streams
pub mod transport;

pub use channel::{ConnectionState, RelayChannel};
pub use error::RelayError;
pub use executor::RelayExecutor;
pub use protocol::{InboundMessage, OutboundMessage, RelayNodeId, RequestId, WebhookRegistration};
pub use transport::{RelayConnector, TcpConnector};
