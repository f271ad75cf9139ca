pub mod config;
pub mod data;
pub mod geocode;
pub mod mapper;
pub mod processing;
pub mod render;
pub mod report;
pub mod server;
pub mod types;
