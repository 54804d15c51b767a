//! Database connection and schema helpers

pub mod init;

pub use init::*;
