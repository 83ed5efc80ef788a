//! murmur-core: shared types, cipher codec, and configuration.
//! All other Murmur crates depend on this one.

pub mod cipher;
pub mod config;
pub mod wire;

pub use cipher::{CipherContext, CipherError, CipherMode};
pub use wire::PeerId;
