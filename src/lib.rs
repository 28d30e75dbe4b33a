//! Provisioning and process supervision of PaperMC servers.

pub mod args;
pub mod catalog;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod logging;
pub mod manager;
pub mod proc;
pub mod properties;
pub mod provision;
pub mod record;
pub mod registry;
pub mod store;
pub mod supervisor;
pub mod util;
