// Library crate for integration tests.
// main.rs has its own mod declarations; this re-exports all modules.

pub mod activity;
pub mod composer;
pub mod config;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod model;
pub mod persistence;
pub mod report;
pub mod routes;
pub mod runner;
pub mod server;
pub mod session;
pub mod state;
pub mod status;
pub mod store;
pub mod view;
