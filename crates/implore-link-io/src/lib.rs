//! implore-link-io - Dataset payloads for linked point-cloud views
//!
//! The host application ships every view's data as a dataset descriptor:
//! a point count, the original axis domains, and a set of per-variable
//! buffers. This crate turns those descriptors into plain `f32` columns.
//!
//! # Buffer encodings
//!
//! - **Encoded**: `"base64:<payload>"` where the payload is little-endian `f32` bytes
//! - **Values**: a plain JSON array of numbers
//!
//! Buffers longer than the point count are truncated on decode. Shorter
//! buffers are kept as-is; consumers bound every access by the point count.

pub mod decode;
pub mod descriptor;

pub use decode::*;
pub use descriptor::*;
