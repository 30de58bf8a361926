pub mod app;
pub mod classify;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod export;
pub mod fs_util;
pub mod http;
pub mod listing;
pub mod output;
pub mod papers;
pub mod report;
pub mod store;
