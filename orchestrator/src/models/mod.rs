//! Domain models

pub mod container;
pub mod deploy;
pub mod server;
