//! WASM-facing reactive API (L6, §4.5/§4.6).
//!
//! A single WASM-owned `Module` instance behind a `lazy_static` `Mutex`,
//! mirrored JSON in/out at the JS boundary; see `reactive` for the entry
//! points.

pub mod reactive;

pub use reactive::*;
