//! Mock transport for testing and development.
//!
//! The mock behaves like a cooperative terminal: it answers initialization,
//! keep-alive, reset and print requests on its own, and lets tests inject
//! any other inbound message through a [`MockTransportHandle`].

pub mod transport;

pub use transport::{MockTransport, MockTransportHandle};
