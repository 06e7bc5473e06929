//! Generic event utilities used by the media players and their callers.
//!
//! - [`EventHandler`]: synchronous, tag-scoped multi-subscriber dispatch
//! - [`ForkedListener`]: joins N asynchronous completions into one callback
//! - [`EventBus`]: asynchronous tagged broadcast for async callers

pub mod bus;
pub mod error;
pub mod forked;
pub mod handler;

pub use bus::{EventBus, Tagged};
pub use error::EventError;
pub use forked::ForkedListener;
pub use handler::{EventHandler, DEFAULT_TAG};
