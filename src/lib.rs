//! Lingocache library
//!
//! Local persistence for the language tutor: a TTL file cache for lesson
//! data, retry and debounce helpers for backend calls, and a cache-through
//! lesson repository.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod debounce;
pub mod repository;
pub mod retry;
