/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Huobi websocket adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod error;
pub mod ws;

// Re-export commonly used types from auth
pub use auth::{Credentials, HmacSigner, compute_hmac256, encode_canonical_query};

pub use config::{MARKET_ENDPOINT, SessionConfig, TRADE_ENDPOINT};
pub use error::{HuobiError, Result};

// Re-export commonly used types from ws
pub use ws::{
    Connector, IdGenerator, Inbound, InboundMessage, Listener, MarketProtocol, MockConnector,
    MockTransport, ProtocolAdapter, RandomIdGenerator, Session, SessionBuilder, TradeProtocol,
    Transport, TungsteniteConnector, listener,
};
