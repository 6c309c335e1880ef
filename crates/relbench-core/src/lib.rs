pub mod config;
pub mod context;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod model;
pub mod provenance;
pub mod providers;
pub mod report;
pub mod storage;
pub mod window;
