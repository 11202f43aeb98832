//! Market feed adapters.

mod http;
mod replay;

pub use http::HttpSnapshotFeed;
pub use replay::ReplayFeed;
