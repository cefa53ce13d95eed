//! Ports: the seams between the channel core and its environment.

pub mod api;
pub mod transport;

pub use api::SpotQueryApi;
pub use transport::{CloseFrame, Connector, Frame, TransportHandle};
