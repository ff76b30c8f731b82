// conc-bench - Library root for testing

pub mod backend;
pub mod bench;
pub mod config;
pub mod error;
