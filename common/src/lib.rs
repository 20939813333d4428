pub mod error;
pub mod duration;
pub mod message;

pub use error::{BrokerError, Result};
pub use message::*;
