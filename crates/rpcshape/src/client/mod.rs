//! Client-side calling styles over a [`Channel`].
//!
//! A [`ServiceClient`] is built from a service's published
//! [`ServiceInfo`](crate::descriptor::ServiceInfo) and offers one entry
//! point per calling style: blocking, async or sink-based unary calls,
//! blocking, async or sink-based server streaming, and item or sink-based
//! client and bidirectional streaming.
//!
//! # Example
//!
//! ```ignore
//! use rpcshape::client::{ClientConfig, LocalChannel, ServiceClient};
//!
//! let channel = Arc::new(LocalChannel::new(registry.clone(), Handle::current()));
//! let info = registry.get("demo.Greeter").unwrap().info();
//! let client = ServiceClient::new(info, channel, ClientConfig::default());
//!
//! let reply: String = client.unary("greet", "World".to_string()).await?;
//! ```

mod channel;
mod config;
mod service_client;
mod streams;

pub use channel::{Channel, ClientMethodHandle, LocalChannel};
pub use config::{ClientConfig, LocalChannelConfig};
pub use service_client::ServiceClient;
pub use streams::{BlockingStream, ResponseStream};
