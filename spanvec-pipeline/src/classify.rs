//! Error classification: turn any error into a stable error code.
//!
//! Three tiers, first match wins:
//! 1. the error reports its own code ([`ClassifiableError::error_code`])
//! 2. the error's type name is a key in the failure mapping
//! 3. the type name itself

use spanvec_core::FailureMapping;
use std::error::Error;
use thiserror::Error;

/// An error the classifier can inspect.
///
/// Implement `error_code` for error types that carry a structured code;
/// the default falls through to the mapping table.
pub trait ClassifiableError: Error {
    /// Code reported by the error itself.
    fn error_code(&self) -> Option<String> {
        None
    }

    /// Name looked up in the failure mapping.
    fn type_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `my_crate::errors::ValueError<u8>` becomes `ValueError`.
pub fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Render an error and its `source()` chain, one cause per line.
pub fn error_chain(error: &dyn Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

/// Maps errors to codes using the loaded failure mapping.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    mapping: FailureMapping,
}

impl ErrorClassifier {
    pub fn new(mapping: FailureMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &FailureMapping {
        &self.mapping
    }

    /// Classify an error. Total: every error yields a non-empty code.
    pub fn classify<E: ClassifiableError + ?Sized>(&self, error: &E) -> String {
        if let Some(code) = error.error_code().filter(|c| !c.is_empty()) {
            return code;
        }
        let type_name = error.type_name();
        if let Some(code) = self.mapping.lookup(&type_name) {
            return code.to_string();
        }
        if type_name.is_empty() {
            "UnknownError".to_string()
        } else {
            type_name
        }
    }
}

// ============================================================================
// CODED ERRORS
// ============================================================================

/// General-purpose error carrying an explicit code.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CodedError {
    code: String,
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl CodedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl ClassifiableError for CodedError {
    fn error_code(&self) -> Option<String> {
        Some(self.code.clone())
    }
}

macro_rules! classifiable_as {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(
            impl ClassifiableError for $ty {
                fn type_name(&self) -> String {
                    $name.to_string()
                }
            }
        )+
    };
}

classifiable_as! {
    std::io::Error => "IoError",
    std::num::ParseIntError => "ParseIntError",
    std::num::ParseFloatError => "ParseFloatError",
    std::str::Utf8Error => "Utf8Error",
    std::string::FromUtf8Error => "FromUtf8Error",
    std::fmt::Error => "FmtError",
    serde_json::Error => "JsonError",
}

impl ClassifiableError for spanvec_core::SpanvecError {}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("bad value: {0}")]
    struct ValueError(String);

    impl ClassifiableError for ValueError {}

    #[derive(Debug, Error)]
    #[error("payment declined")]
    struct PaymentError {
        code: Option<String>,
    }

    impl ClassifiableError for PaymentError {
        fn error_code(&self) -> Option<String> {
            self.code.clone()
        }
    }

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::new(FailureMapping::from_entries([
            ("ValueError", "INVALID_INPUT"),
            ("PaymentError", "MAPPED_PAYMENT"),
        ]))
    }

    #[test]
    fn test_explicit_code_beats_mapping() {
        let err = PaymentError {
            code: Some("CARD_DECLINED".to_string()),
        };
        assert_eq!(classifier().classify(&err), "CARD_DECLINED");
    }

    #[test]
    fn test_mapping_used_without_code() {
        assert_eq!(
            classifier().classify(&ValueError("x".into())),
            "INVALID_INPUT"
        );
        assert_eq!(
            classifier().classify(&PaymentError { code: None }),
            "MAPPED_PAYMENT"
        );
    }

    #[test]
    fn test_falls_back_to_type_name() {
        let empty = ErrorClassifier::default();
        assert_eq!(empty.classify(&ValueError("x".into())), "ValueError");
        let parse_err = "abc".parse::<i32>().unwrap_err();
        assert_eq!(empty.classify(&parse_err), "ParseIntError");
    }

    #[test]
    fn test_empty_code_falls_through() {
        let err = PaymentError {
            code: Some(String::new()),
        };
        assert_eq!(classifier().classify(&err), "MAPPED_PAYMENT");
    }

    #[test]
    fn test_coded_error_and_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = CodedError::new("STORAGE_DOWN", "could not save").with_source(io);
        assert_eq!(classifier().classify(&err), "STORAGE_DOWN");
        assert_eq!(error_chain(&err), "could not save\ncaused by: disk gone");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("a::b::ValueError"), "ValueError");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
