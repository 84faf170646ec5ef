pub mod config;
pub mod dispatch;
pub mod error;
pub mod organize;
pub mod response;
pub mod server;
pub mod tools;
