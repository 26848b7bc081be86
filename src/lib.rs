pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fastq;
pub mod fs_util;
pub mod galaxy;
pub mod log;
pub mod output;
pub mod pairing;
pub mod provenance;
pub mod tools;
pub mod tui;
pub mod waiter;
