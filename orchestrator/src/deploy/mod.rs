//! Deployment module

pub mod compose;
pub mod executor;
pub mod fsm;
pub mod locks;
pub mod manifest;
pub mod pipeline;
pub mod registrar;
pub mod service;
pub mod tracker;
