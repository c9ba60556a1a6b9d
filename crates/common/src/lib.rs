//! Common utilities and shared types for fieldline.
//!
//! This crate provides foundational components used across all fieldline crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Local store**: Profile-scoped key/value persistence via [`LocalStore`]
//!
//! # Example
//!
//! ```no_run
//! use fieldline_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {}", id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod local_store;

pub use config::{
    AuthConfig, Config, CoordinatorSettings, DatabaseConfig, PushConfig, RetentionConfig,
    ServerConfig,
};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use local_store::{FileStore, LocalStore, MemoryStore, keys as store_keys};
