pub mod download;
pub mod executor;
pub mod parser;
pub mod poller;
