pub mod catalog;
pub mod client;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod generation;
pub mod output;
pub mod progress;
pub mod results;
pub mod search;
pub mod state;
pub mod store;
pub mod worker;
