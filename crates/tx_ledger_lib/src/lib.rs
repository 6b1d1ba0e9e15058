pub mod chain_state;
pub mod config;
pub mod db;
pub mod error;
pub mod eth;
pub mod model;
pub mod oracle;
pub mod query;
pub mod runtime;
pub mod server;
pub mod service;
pub mod setup;
pub mod store;
pub mod tracker;
pub mod transaction;
pub mod utils;
