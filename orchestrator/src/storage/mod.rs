//! On-disk layout, workspaces and settings

pub mod layout;
pub mod settings;
pub mod workspace;
