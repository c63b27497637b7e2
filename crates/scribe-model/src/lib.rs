pub mod conversation;
pub mod error;
pub mod export;
pub mod title;

pub use conversation::{
    Author, Content, ContentType, Conversation, Message, MessageNode, Role, Status, Thought,
    ROOT_ID,
};
pub use error::{ModelError, Result};
pub use export::CommonExport;
pub use title::{derive_title_from_first_user, is_generic_title};
