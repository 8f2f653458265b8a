/*
[INPUT]:  Session configuration, topics, listeners, inbound frames
[OUTPUT]: Self-healing websocket sessions for the market and trade streams
[POS]:    WebSocket layer - transport, protocol dialects, routing and session lifecycle
[UPDATE]: When adding a stream variant or changing connection logic
*/

pub mod codec;
pub mod correlator;
pub mod dispatcher;
pub mod heartbeat;
pub mod message;
pub mod mock;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use codec::{compress_payload, decode_frame, encode_payload};
pub use correlator::{IdGenerator, RandomIdGenerator, RequestCorrelator};
pub use dispatcher::MessageDispatcher;
pub use heartbeat::{HeartbeatTarget, LivenessClock};
pub use message::{AuthRequest, InboundMessage, error_message};
pub use mock::{MockConnector, MockTransport};
pub use protocol::{Inbound, MarketProtocol, ProtocolAdapter, TradeProtocol};
pub use registry::{Listener, SubscriptionRegistry, listener};
pub use session::{Session, SessionBuilder};
pub use transport::{Connector, Transport, TungsteniteConnector};
