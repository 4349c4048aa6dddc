//! Feed format detection, auto-discovery and item deduplication.
//!
//! - [`feed`]: turns downloaded bytes into feed metadata and items
//! - [`merge`]: reconciles parsed items with a feed's stored item set
//! - [`update`]: the update queue and the driver that fetches, parses and merges
//! - [`fetch`], [`storage`], [`config`]: HTTP, SQLite and TOML plumbing

pub mod config;
pub mod feed;
pub mod fetch;
pub mod merge;
pub mod model;
pub mod storage;
pub mod update;
pub mod util;
