pub mod admin;
pub mod api;
pub mod cluster;
pub mod contracts;
pub mod memstore;
pub mod metrics;
pub mod region;
pub mod server;
pub mod storage;
