pub mod agent;
pub mod allocator;
pub mod batch;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pathfinding;
pub mod rng;
pub mod types;
pub mod victims;
pub mod world;
