//! Restart-durable download progress, kept outside the dictionary database.

mod model;
mod store;

pub use model::DownloadCheckpoint;
pub use store::CheckpointStore;
