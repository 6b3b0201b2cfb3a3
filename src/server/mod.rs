pub mod auth;
pub mod builder;
pub mod dispatcher;
pub mod faults;
pub mod handler;
pub mod metrics;
pub mod proxy;
pub mod server;
pub mod state;
mod util;

pub use builder::{MockEndpointServer, MockEndpointServerBuilder};
pub use server::{Error, MockServer};
