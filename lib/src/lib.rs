mod config;
mod json;
mod topic;
mod track;
mod wire;

pub use config::*;
pub use json::*;
pub use topic::*;
pub use track::*;
pub use wire::*;
