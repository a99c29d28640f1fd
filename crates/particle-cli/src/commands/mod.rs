//! Command implementations for particle-cli

pub mod info;
pub mod publish;
pub mod subscribe;

pub use info::{info, versions, whoami};
pub use publish::publish;
pub use subscribe::subscribe;
