//! Notegraph Core Library
//!
//! Knowledge graph and full-text search engine for a personal knowledge
//! base. The host application owns content (pages and blocks) and calls
//! into this crate to keep the reference graph, tag hierarchy, and search
//! index consistent with every content mutation.

pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod graph;
pub mod logging;
pub mod query;
pub mod search;
pub mod tags;
pub mod text;
