pub mod blocking;
pub mod engine;
pub mod manager;
pub mod scoring;
