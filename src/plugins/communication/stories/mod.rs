pub mod error;
pub mod handlers;
pub mod models;
pub mod plugin;
pub mod policy;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sweeper;

pub use error::{StoreError, StoryError};
pub use plugin::StoriesPlugin;
pub use repo::PgStoryStore;
pub use service::{StoryLimits, StoryService};
pub use store::{DynStoryStore, InMemoryStoryStore, StoryStore};
pub use sweeper::{ExpirationSweeper, SweepReport};

#[cfg(test)]
mod http_tests;
