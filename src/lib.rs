//! LINE bot answering air-quality and weather questions for Taiwanese towns.

pub mod config;
pub mod db;
pub mod formatter;
pub mod handlers;
pub mod line;
pub mod lookup;
pub mod model;
pub mod registry;
pub mod reply;
pub mod server;
pub mod sites;
pub mod snapshot;
pub mod state;
pub mod updater;
