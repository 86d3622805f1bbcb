use thiserror::Error;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum FormError {
    #[error("a field path is required to bind a field, eg. `form.register_field(\"my_field\", options)`")]
    MissingFieldPath,

    #[error("can't use {operation} on non-array field `{path}`")]
    InvalidOperation {
        operation: &'static str,
        path: String,
    },

    #[error("{operation} index {index} is out of bounds for field `{path}` of length {len}")]
    IndexOutOfBounds {
        operation: &'static str,
        path: String,
        index: usize,
        len: usize,
    },

    #[error("validator fault: {0}")]
    ValidatorFault(String),

    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),

    #[error("failed to convert form values: {0}")]
    Serialization(String),
}

pub type FormResult<T> = Result<T, FormError>;

impl From<serde_json::Error> for FormError {
    fn from(error: serde_json::Error) -> Self {
        FormError::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FormError::InvalidOperation {
            operation: "insert",
            path: "friends".into(),
        };
        assert_eq!(
            err.to_string(),
            "can't use insert on non-array field `friends`"
        );

        let err = FormError::IndexOutOfBounds {
            operation: "swap",
            path: "friends".into(),
            index: 4,
            len: 2,
        };
        assert_eq!(
            err.to_string(),
            "swap index 4 is out of bounds for field `friends` of length 2"
        );

        let err = FormError::StatePoisoned("reading values");
        assert_eq!(err.to_string(), "form state lock poisoned while reading values");
    }
}
