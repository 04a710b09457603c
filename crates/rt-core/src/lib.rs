pub mod aws;
pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod prompt;
pub mod release;
pub mod schema;
pub mod store;
pub mod template;
pub mod terraform;
pub mod traffic;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, RtError};
