pub mod forwarder;
pub mod network;
pub mod registry;

pub use forwarder::{ForwardError, ForwardedResponse, InboundRequest, UpstreamForwarder};
pub use network::{AccessList, NetParseError, NetworkMatcher};
pub use registry::{Service, ServiceRegistry};
