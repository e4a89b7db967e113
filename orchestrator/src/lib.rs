//! Beanstalk: multi-tenant compose deployment orchestrator.
//!
//! Each tenant ("server") owns a bridge network, a compose project and a
//! workspace tree. Deployments are validated and tenant-labelled up front,
//! then run on a bounded worker pool while their records move through
//! `PENDING -> DEPLOYING -> SUCCESS | FAILED`.

pub mod app;
pub mod containers;
pub mod deploy;
pub mod docker;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod provision;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
