//! Integration tests for the beanstalk orchestrator

mod common;
mod test_deploy_flow;
mod test_monitor;
