//! Newsdesk - an AI news feed aggregator
//!
//! This crate polls a fixed set of syndication feeds on a schedule,
//! keeps a bounded window of the most recent articles in memory, and
//! serves them over a small read-only JSON API.

pub mod config;
pub mod fetcher;
pub mod routes;
pub mod store;
