//! Persistence layer: MongoDB wrapper, document schemas, and the store trait

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::{MongoClient, MongoCollection};
pub use store::{MarketplaceStore, MemoryStore, MongoStore, PointsUpdate};
