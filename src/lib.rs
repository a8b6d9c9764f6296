pub mod cli;
pub mod clip;
pub mod config;
pub mod db;
pub mod imdb;
mod metrics;
pub mod scan;
pub mod server;
pub mod utils;
pub mod vectors;

pub use config::Opts;
pub use imdb::{ClipDB, SearchResult};
