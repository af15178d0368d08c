pub mod demo;
pub mod oracle_pool;
