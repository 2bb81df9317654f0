//! Database bootstrap and schema

pub mod init;

pub use init::*;
