pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fetch;
pub mod generator;
pub mod notify;
pub mod projection;
pub mod runtime;
pub mod source;
pub mod store;
pub mod views;
