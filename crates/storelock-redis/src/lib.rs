//! Redis backend for the lock protocol.
//!
//! Implements the store contract over a single Redis server. Simple
//! acquisition is one `SET NX PX`; everything that must check before it
//! acts (release, renewal, reentrant counts, the fair queue, the
//! read-write pair) runs server-side as a Lua script so the
//! check-then-act is indivisible.

pub mod client;
mod scripts;
pub mod store;

pub use client::RedisStoreBuilder;
pub use store::RedisStore;
