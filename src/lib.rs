//! Collaborative playlist backend: parties, voting, and the caches that keep
//! them fast.

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod join_code;
pub mod models;
pub mod party;
pub mod playlist;
pub mod search;
pub mod songs;
pub mod sources;
pub mod storage;

pub use app::OpenParty;
pub use config::Config;
