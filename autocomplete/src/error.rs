use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutocompleteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid disable pattern: {0}")]
    Pattern(String),

    #[error("Model stream error: {0}")]
    Model(String),
}

impl From<globset::Error> for AutocompleteError {
    fn from(err: globset::Error) -> Self {
        AutocompleteError::Pattern(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutocompleteError>;
