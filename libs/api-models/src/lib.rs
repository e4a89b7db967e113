//! Wire models shared by the beanstalk orchestrator and its clients

pub mod models;
