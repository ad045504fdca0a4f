pub mod cache;
pub mod db;
pub mod http;
pub mod worker;
