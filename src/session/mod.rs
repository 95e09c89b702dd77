//! Realtime assistant session: transport abstraction, state machine, driver.

pub mod assistant;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use assistant::{
    AssistantSession, SessionController, SessionDriver, SessionEvent, SessionHandle,
    SessionOptions, SessionState,
};
pub use transport::{
    AudioOutput, MockAudioOutput, MockTransport, NullAudioOutput, SessionTransport, TransportEvent,
};
#[cfg(feature = "websocket")]
pub use websocket::WebsocketTransport;
