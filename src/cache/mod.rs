//! The KV-backed variant cache: key derivation, chunk locking, the version
//! store, the KV engine, cache-tag generation, byte-range slicing, and the
//! orchestrator tying them together.

pub mod key;
pub mod kv;
pub mod lock;
pub mod orchestrator;
pub mod range;
pub mod tags;
pub mod version;
