//! Publish/subscribe broker boundary.
//!
//! The broker's own transport and reconnection behavior live outside this
//! crate; campfires and valleys consume the port defined here. The
//! in-process adapter exists so a valley can run self-contained and so the
//! lifecycle paths are testable without external infrastructure.

pub mod error;
pub mod in_process;
pub mod ports;

pub use error::{BrokerError, BrokerErrorKind};
pub use in_process::InProcessBroker;
pub use ports::{BrokerPort, ChannelHandlerPort};
