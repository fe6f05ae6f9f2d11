//! Object store access for Drover.
//!
//! [`Session`] is the path-based client: every operation takes fully
//! qualified `s3://container/key` strings. Stores are handed out per
//! container by a [`StoreProvider`]:
//!
//! - [`S3StoreProvider`]: AWS S3 or any S3-compatible endpoint
//! - [`MemoryStoreProvider`]: in-process buckets for tests and dry runs

pub mod memory;
pub mod provider;
pub mod s3;
pub mod session;

pub use memory::MemoryStoreProvider;
pub use provider::StoreProvider;
pub use s3::S3StoreProvider;
pub use session::Session;
