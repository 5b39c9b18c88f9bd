// src/ingest/providers/mod.rs
pub mod baseline;
pub mod live_http;

pub use baseline::BaselineProvider;
pub use live_http::LiveHttpProvider;
