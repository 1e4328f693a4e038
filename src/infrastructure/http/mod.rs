//! HTTP infrastructure - reqwest implementation of the backend transport

mod transport;

pub use transport::HttpTransport;
