pub mod clusters;
pub mod config;
pub mod import;
pub mod matches;
pub mod output;
pub mod preview;
pub mod publish;
