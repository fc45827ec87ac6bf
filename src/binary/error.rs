use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BinaryError {
    #[error("Attribute parsing failed: {0}")]
    AttrParse(String),
    #[error("Missing required attribute: {0}")]
    MissingAttr(String),
    #[error("Multiple attribute parsing errors: {0:?}")]
    AttrList(Vec<BinaryError>),
}

pub type Result<T> = std::result::Result<T, BinaryError>;
