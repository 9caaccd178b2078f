//! Test doubles and fixtures for exercising a
//! [`CmClient`](steamframe::client::CmClient) without a network.
//!
//! [`MockConnectionFactory`] hands out [`MockConnection`]s whose lifecycle
//! events are injected by the test, [`MockServerList`] records every quality
//! mark, and the [`packets`] builders produce the raw bytes a CM server
//! would send.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use steamframe::{client::{ClientConfig, CmClient}, discovery::ServerRecord};
//! use steamframe_testing::{MockConnectionFactory, RecordingHandler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let factory = Arc::new(MockConnectionFactory::new());
//! let config = ClientConfig::builder()
//!     .connection_factory(factory.clone())
//!     .servers(vec![ServerRecord::socket_server("10.0.0.1:27017".parse().unwrap())])
//!     .build()
//!     .unwrap();
//! let client = CmClient::new(config, RecordingHandler::default());
//!
//! client.connect(None);
//! factory.last().unwrap().emit_connected();
//! assert!(client.is_connected());
//! # }
//! ```

pub mod handler;
pub mod logging;
pub mod packets;
pub mod servers;
pub mod transport;

pub use handler::{HandlerEvent, RecordingDebugListener, RecordingHandler};
pub use logging::{LoggerHandle, logger};
pub use servers::MockServerList;
pub use transport::{MockConnection, MockConnectionFactory};
