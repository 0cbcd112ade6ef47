use dog_core::DogError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the in-memory store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No record '{id}' in '{table}'")]
    NotFound { table: String, id: String },

    #[error("Record '{id}' already exists in '{table}'")]
    Conflict { table: String, id: String },

    #[error("Records must be JSON objects")]
    NotAnObject,
}

impl StoreError {
    pub fn into_dog(self) -> DogError {
        let dog = match &self {
            StoreError::NotFound { .. } => DogError::not_found(self.to_string()),
            StoreError::Conflict { .. } => DogError::conflict(self.to_string()),
            StoreError::NotAnObject => DogError::unprocessable(self.to_string()),
        };
        dog.with_source(self.into())
    }

    pub fn into_anyhow(self) -> anyhow::Error {
        self.into_dog().into_anyhow()
    }
}
