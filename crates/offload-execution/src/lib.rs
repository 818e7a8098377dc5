pub mod client;
pub mod cluster;
pub mod coordinator;
pub mod device;
pub mod engine;
pub mod error;
pub mod id;
pub mod message;
pub mod resource;
pub mod task;
pub mod worker;
