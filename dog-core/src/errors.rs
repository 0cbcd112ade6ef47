//! # Errors (Feathers-style)
//!
//! Structured errors that travel through the hook pipeline inside
//! `anyhow::Error` and keep a transport-ready classification (status code,
//! Feathers `name` / `className`). Typed crate errors (for example the
//! tenancy errors) are attached as `source` so callers can still downcast
//! to them.
//!
//! With feature `serde`, `data` / `errors` are `serde_json::Value` and
//! `to_json()` renders the Feathers payload.

use std::fmt;

use anyhow::Error as AnyError;

pub type DogResult<T> = std::result::Result<T, AnyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,       // 400
    NotAuthenticated, // 401
    Forbidden,        // 403
    NotFound,         // 404
    MethodNotAllowed, // 405
    Conflict,         // 409
    Unprocessable,    // 422
    GeneralError,     // 500
    NotImplemented,   // 501
    Unavailable,      // 503
}

impl ErrorKind {
    /// `(status, Feathers name, Feathers className)`
    fn meta(self) -> (u16, &'static str, &'static str) {
        match self {
            ErrorKind::BadRequest => (400, "BadRequest", "bad-request"),
            ErrorKind::NotAuthenticated => (401, "NotAuthenticated", "not-authenticated"),
            ErrorKind::Forbidden => (403, "Forbidden", "forbidden"),
            ErrorKind::NotFound => (404, "NotFound", "not-found"),
            ErrorKind::MethodNotAllowed => (405, "MethodNotAllowed", "method-not-allowed"),
            ErrorKind::Conflict => (409, "Conflict", "conflict"),
            ErrorKind::Unprocessable => (422, "Unprocessable", "unprocessable"),
            ErrorKind::GeneralError => (500, "GeneralError", "general-error"),
            ErrorKind::NotImplemented => (501, "NotImplemented", "not-implemented"),
            ErrorKind::Unavailable => (503, "Unavailable", "unavailable"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.meta().0
    }

    pub fn name(&self) -> &'static str {
        self.meta().1
    }

    pub fn class_name(&self) -> &'static str {
        self.meta().2
    }

    /// Client errors (4xx) are safe to show as-is.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(feature = "serde")]
pub type ErrorValue = serde_json::Value;

#[cfg(not(feature = "serde"))]
pub type ErrorValue = std::sync::Arc<dyn std::any::Any + Send + Sync>;

#[derive(Debug)]
pub struct DogError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<ErrorValue>,
    pub errors: Option<ErrorValue>,
    pub source: Option<AnyError>,
}

impl DogError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: ErrorValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: ErrorValue) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    pub fn from_anyhow(err: &AnyError) -> Option<&DogError> {
        err.downcast_ref::<DogError>()
    }

    /// Kind of `err` if it is (or wraps at the top) a DogError.
    pub fn kind_of(err: &AnyError) -> Option<ErrorKind> {
        Self::from_anyhow(err).map(|e| e.kind)
    }

    /// The typed source error, if the DogError carries one of type `E`.
    pub fn source_as<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.source.as_ref().and_then(|s| s.downcast_ref::<E>())
    }

    /// Keep DogErrors as they are, wrap anything else as GeneralError.
    pub fn normalize(err: AnyError) -> DogError {
        match err.downcast::<DogError>() {
            Ok(dog) => dog,
            Err(other) => DogError::new(ErrorKind::GeneralError, other.to_string()).with_source(other),
        }
    }

    /// Copy without `source`, for returning to clients.
    pub fn sanitize_for_client(&self) -> DogError {
        DogError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }
}

macro_rules! kind_constructors {
    ($($fn_name:ident => $kind:ident),* $(,)?) => {
        impl DogError {
            $(
                pub fn $fn_name(msg: impl Into<String>) -> Self {
                    Self::new(ErrorKind::$kind, msg)
                }
            )*
        }
    };
}

kind_constructors! {
    bad_request => BadRequest,
    not_authenticated => NotAuthenticated,
    forbidden => Forbidden,
    not_found => NotFound,
    method_not_allowed => MethodNotAllowed,
    conflict => Conflict,
    unprocessable => Unprocessable,
    general_error => GeneralError,
    not_implemented => NotImplemented,
    unavailable => Unavailable,
}

impl fmt::Display for DogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for DogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "serde")]
impl DogError {
    /// Feathers-ish JSON payload.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }
}

/// Convenience helper for "bail with DogError".
#[macro_export]
macro_rules! bail_dog {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::DogError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::DogError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("typed")]
    struct Typed;

    #[test]
    fn normalize_keeps_dog_errors() {
        let err = DogError::forbidden("nope").into_anyhow();
        assert_eq!(DogError::kind_of(&err), Some(ErrorKind::Forbidden));
        let dog = DogError::normalize(err);
        assert_eq!(dog.code(), 403);
        assert_eq!(dog.class_name(), "forbidden");
        assert!(dog.kind.is_client_error());
    }

    #[test]
    fn normalize_wraps_foreign_errors() {
        let dog = DogError::normalize(anyhow::anyhow!("boom"));
        assert_eq!(dog.kind, ErrorKind::GeneralError);
        assert_eq!(dog.message, "boom");
        assert!(dog.sanitize_for_client().source.is_none());
    }

    #[test]
    fn typed_source_is_recoverable() {
        let dog = DogError::general_error("wrapped").with_source(Typed.into());
        assert!(dog.source_as::<Typed>().is_some());
    }
}
