// src/lib.rs

//! httpsync: incremental mirroring of HTTP directory listings.
//!
//! A run crawls the source into an index [`models::Tree`], compares it with
//! the index persisted by the previous run and hands new files to a download
//! manager. Files removed upstream are deleted locally.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
