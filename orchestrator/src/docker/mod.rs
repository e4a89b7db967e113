//! Container engine access

pub mod engine;
pub mod naming;
