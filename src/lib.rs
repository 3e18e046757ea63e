//! # Videogate — Edge Video Transformation Gateway
//!
//! Accepts HTTP requests for a video under an arbitrary path, resolves the path to a
//! known origin and its ordered candidate sources, serves a previously transformed
//! variant from a KV store or requests a fresh one from an upstream media-transformation
//! endpoint, and returns the final bytes — including byte-range slices — to the client.
//!
//! ## Architecture
//!
//! - `config`: typed configuration schema, file loading, validation
//! - `error`: crate-wide error taxonomy and HTTP status mapping
//! - `options`: the canonical `TransformOptions` model and the Option Resolver
//! - `origin`: origin/source routing model, the multi-source fetcher, and the
//!   404-triggered retry/failover coordinator
//! - `transform`: the upstream media-transformation client
//! - `imquery`: responsive-sizing (IMQuery) derivative resolution
//! - `cache`: the KV storage engine, chunk locking, version store, cache-tag
//!   generation, byte-range slicing, and the cache orchestrator
//! - `kv_store`: pluggable KV backend trait plus in-memory and `sled`-backed
//!   implementations
//! - `bg`: the scoped background executor used for write-back and version bumps
//! - `api`: the axum HTTP surface (routes, middleware, request handling)

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod bg;
pub mod cache;
pub mod config;
pub mod error;
pub mod imquery;
pub mod kv_store;
pub mod options;
pub mod origin;
pub mod telemetry;
pub mod transform;

/// Crate version, re-exported for startup banners and diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, re-exported for startup banners and diagnostics.
pub const NAME: &str = env!("CARGO_PKG_NAME");
