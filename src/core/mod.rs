pub mod command;
pub mod error;
pub mod event;
pub mod export;
pub mod formatter;
pub mod job;
pub mod metadata;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod summary;
pub mod transcode;
