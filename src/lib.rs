//! Decryption core for WeChat (Windows, database format "V4") encrypted
//! SQLite databases and encrypted `.dat` image blobs.
//!
//! This crate is a self-contained library: it has no FFI surface and no
//! opinions about where the master key comes from or how results are
//! displayed. See [`db`], [`image`] and [`batch`] for the three public
//! entry points, and [`page_codec`] for the page-level primitive they
//! are all built on.

pub mod batch;
pub mod db;
pub mod error;
pub mod image;
pub mod key;
pub mod page_codec;

pub use error::{CoreError, CoreResult};
pub use key::MasterKey;
