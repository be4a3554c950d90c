pub mod router;
pub mod transport;

pub use router::{RouterError, RouterResult};
pub use transport::TransportError;
