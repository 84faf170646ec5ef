pub mod connection;
pub mod estimate;
pub mod models;
pub mod organize;
