/// Settings loading (defaults, file, environment).
pub mod config;
/// Pattern-aware event emitter with deferred dispatch.
pub mod emitter;
/// Router and transport error types.
pub mod error;
/// Logging setup (formatting, filters).
pub mod logging;
/// Channel router: reference-counted subscriptions over a transport.
pub mod router;
/// Pub/Sub transport abstraction and the in-memory implementation.
pub mod transport;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::{RouterConfig, Settings};
/// Emitter, listeners and schedulers.
pub use emitter::{
    ChannelPattern, Listener, PatternEmitter, QueueScheduler, Scheduler, Task, TokioScheduler,
};
/// Operation errors and result types.
pub use error::{RouterError, RouterResult, TransportError};
/// Logging.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Router API.
pub use router::{ChannelListener, ChannelRouter, Payload, SubscriptionCommand};
/// Transports.
pub use transport::{MemoryTransport, Transport, TransportEvent};
