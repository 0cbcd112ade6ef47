// Tenancy errors.

use dog_core::errors::DogError;
use dog_core::SessionError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenancyError {
    /// The login in the call context has no user record.
    #[error("Principal not found: {0}")]
    PrincipalNotFound(String),

    /// The data layer refused the tenant filter. The read must not run.
    #[error("Filter '{filter}' could not be activated: {source}")]
    FilterActivation { filter: String, source: SessionError },

    /// Deny-by-default policy: the principal has no tenant for a read.
    #[error("Principal '{login}' has no '{dimension}' tenant")]
    TenantRequired { login: String, dimension: String },

    #[error("Tenant lookup failed: {0}")]
    Lookup(String),

    #[error("Invalid tenancy configuration: {0}")]
    InvalidConfig(String),
}

impl TenancyError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Classify for transports; the typed error stays reachable as source.
    pub fn into_dog(self) -> DogError {
        let dog = match &self {
            TenancyError::PrincipalNotFound(_) => DogError::not_authenticated(self.to_string()),
            TenancyError::TenantRequired { .. } => DogError::forbidden(self.to_string()),
            TenancyError::InvalidConfig(_) => DogError::bad_request(self.to_string()),
            TenancyError::FilterActivation { .. } | TenancyError::Lookup(_) => {
                DogError::general_error(self.to_string())
            }
        };
        dog.with_source(self.into())
    }

    pub fn into_anyhow(self) -> anyhow::Error {
        self.into_dog().into_anyhow()
    }

    /// Recover the typed error from a pipeline error.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&TenancyError> {
        err.downcast_ref::<TenancyError>().or_else(|| {
            DogError::from_anyhow(err).and_then(|dog| dog.source_as::<TenancyError>())
        })
    }
}
