pub mod broker;
pub mod campfire;
pub mod cli;
pub mod config;
pub mod logging;
pub mod party_box;
pub mod torch;
pub mod valley;
