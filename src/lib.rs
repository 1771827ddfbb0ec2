pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;

pub use call_relay_types as types;
pub use call_relay_utils as utils;
pub use client::{connect_with_config, Client, ServerRx};
pub use error::RelayError;
