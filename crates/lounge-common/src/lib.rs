pub mod errors;
pub mod id;

pub use errors::{ConfigError, LoungeError};
pub use id::{new_id, now_millis, ConversationId};

pub type Result<T> = std::result::Result<T, LoungeError>;
