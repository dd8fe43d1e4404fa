pub mod analytics;
pub mod blob;
pub mod catalog;
pub mod classification;
pub mod config;
mod db;
pub mod error;
pub mod logging;
pub mod resolution;
pub mod server;
pub mod version;
