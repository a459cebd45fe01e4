pub mod changelog;
pub mod cli;
pub mod config;

pub use changelog::ChangeLog;
pub use config::Configuration;
