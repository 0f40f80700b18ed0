//! Storage - backends for training checkpoints
//!
//! - [`LocalStorage`]: files under a root directory, atomic writes
//! - [`MemoryStorage`]: process-local map, used by tests
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, LocalStorage};
//! use bytes::Bytes;
//!
//! # async fn example() -> train_core::Result<()> {
//! let storage = LocalStorage::new("saved/models");
//! storage.write("checkpoint-epoch2.ckpt", Bytes::from(vec![1, 2, 3])).await?;
//! let data = storage.read("checkpoint-epoch2.ckpt").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;
mod memory;

pub use backend::StorageBackend;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
