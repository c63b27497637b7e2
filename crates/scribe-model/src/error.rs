use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing root node")]
    MissingRoot,

    #[error("node {id} has parent {parent} not present in mapping")]
    DanglingParent { id: String, parent: String },

    #[error("node {id} lists child {child} not present in mapping")]
    DanglingChild { id: String, child: String },

    #[error("node {id} is not listed in the children of its parent {parent}")]
    UnlinkedChild { id: String, parent: String },

    #[error("non-root node {id} has no parent")]
    OrphanNode { id: String },

    #[error("current_node {id} not present in mapping")]
    BadCurrentNode { id: String },

    #[error("conversation_id is empty")]
    EmptyConversationId,
}

pub type Result<T> = std::result::Result<T, ModelError>;
