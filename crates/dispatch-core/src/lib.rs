pub mod config;
pub mod error;
pub mod ids;

pub use error::{DispatchError, Result};
pub use ids::{ChannelId, InstanceId, JobId, SessionId};
