pub mod canonical;
pub mod repository;
pub mod types;
