//! Rowgraph Core — row values, error taxonomy, engine configuration, cancellation.

pub mod cancel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod value;

pub use cancel::CancellationToken;
pub use config::{EngineConfig, ListPolicy, DEFAULT_NODE_NAME, MAX_TEXT_LEN};
pub use endpoint::{Direction, EndpointRef};
pub use error::{EndpointSide, Error, Result};
pub use value::{Properties, Row, Value};
