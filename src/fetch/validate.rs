//! Content validation for downloaded artifacts.
//!
//! Defends against silently-corrupt or anti-bot-challenge responses: an
//! HTML "access denied" page served with HTTP 200 must never be written to
//! disk as if it were a paper. Rules run in order and the first failure
//! short-circuits: size window, magic signature, declared content type.

use thiserror::Error;

use super::constants::{MAX_CONTENT_BYTES, MIN_CONTENT_BYTES};
use crate::task::ContentKind;

/// Why a downloaded body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    /// Body is below the minimum plausible artifact size.
    #[error("body too small: {0} bytes")]
    TooSmall(u64),

    /// Body exceeds the maximum accepted artifact size.
    #[error("body too large: {0} bytes")]
    TooLarge(u64),

    /// Leading bytes do not match the expected format's magic signature.
    #[error("magic signature mismatch")]
    BadMagic,

    /// Declared content type is known-incompatible with the expected kind.
    #[error("incompatible content type: {0}")]
    WrongContentType(String),
}

/// Validates downloaded bytes against expected-format rules.
#[derive(Debug, Clone)]
pub struct Validator {
    min_bytes: u64,
    max_bytes: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            min_bytes: MIN_CONTENT_BYTES,
            max_bytes: MAX_CONTENT_BYTES,
        }
    }
}

impl Validator {
    /// Creates a validator with custom size bounds.
    #[must_use]
    pub fn new(min_bytes: u64, max_bytes: u64) -> Self {
        Self {
            min_bytes,
            max_bytes,
        }
    }

    /// Checks a downloaded body against the expected kind.
    ///
    /// A missing or generic declared content type is not itself a failure -
    /// servers are unreliable here. Only known-incompatible declarations
    /// (e.g. `text/html` for an expected PDF) are rejected.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule as an [`InvalidReason`].
    pub fn validate(
        &self,
        bytes: &[u8],
        declared_content_type: Option<&str>,
        expected: ContentKind,
    ) -> Result<(), InvalidReason> {
        let len = bytes.len() as u64;
        if len < self.min_bytes {
            return Err(InvalidReason::TooSmall(len));
        }
        if len > self.max_bytes {
            return Err(InvalidReason::TooLarge(len));
        }

        if !bytes.starts_with(expected.magic()) {
            return Err(InvalidReason::BadMagic);
        }

        if let Some(declared) = declared_content_type {
            if expected.rejects_content_type(declared) {
                return Err(InvalidReason::WrongContentType(declared.to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A plausible PDF body: correct magic, comfortably inside the window.
    fn pdf_body(len: usize) -> Vec<u8> {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(len, 0);
        body
    }

    fn small_validator() -> Validator {
        Validator::new(16, 1024)
    }

    #[test]
    fn test_valid_pdf_passes() {
        let validator = small_validator();
        let body = pdf_body(128);
        assert!(
            validator
                .validate(&body, Some("application/pdf"), ContentKind::Pdf)
                .is_ok()
        );
    }

    #[test]
    fn test_missing_content_type_passes() {
        let validator = small_validator();
        let body = pdf_body(128);
        assert!(validator.validate(&body, None, ContentKind::Pdf).is_ok());
    }

    #[test]
    fn test_generic_content_type_passes() {
        let validator = small_validator();
        let body = pdf_body(128);
        assert!(
            validator
                .validate(&body, Some("application/octet-stream"), ContentKind::Pdf)
                .is_ok()
        );
    }

    #[test]
    fn test_too_small_rejected() {
        let validator = small_validator();
        let body = pdf_body(8);
        assert_eq!(
            validator.validate(&body, None, ContentKind::Pdf),
            Err(InvalidReason::TooSmall(8))
        );
    }

    #[test]
    fn test_too_large_rejected() {
        let validator = small_validator();
        let body = pdf_body(4096);
        assert_eq!(
            validator.validate(&body, None, ContentKind::Pdf),
            Err(InvalidReason::TooLarge(4096))
        );
    }

    #[test]
    fn test_bad_magic_rejected_despite_size() {
        let validator = small_validator();
        let mut body = vec![0u8; 128];
        body[..5].copy_from_slice(b"<html");
        assert_eq!(
            validator.validate(&body, None, ContentKind::Pdf),
            Err(InvalidReason::BadMagic)
        );
    }

    #[test]
    fn test_html_content_type_rejected() {
        // Correct magic and size but the server declared HTML: reject.
        let validator = small_validator();
        let body = pdf_body(128);
        assert_eq!(
            validator.validate(&body, Some("text/html; charset=utf-8"), ContentKind::Pdf),
            Err(InvalidReason::WrongContentType(
                "text/html; charset=utf-8".to_string()
            )),
        );
    }

    #[test]
    fn test_size_checked_before_magic() {
        // An undersized HTML error page reports TooSmall, not BadMagic.
        let validator = small_validator();
        let body = b"<html>denied</html>".to_vec();
        let body = &body[..8];
        assert_eq!(
            validator.validate(body, None, ContentKind::Pdf),
            Err(InvalidReason::TooSmall(8))
        );
    }

    #[test]
    fn test_default_bounds() {
        let validator = Validator::default();
        // 50 KB - 1 is too small under default bounds.
        let body = pdf_body(50 * 1024 - 1);
        assert!(matches!(
            validator.validate(&body, None, ContentKind::Pdf),
            Err(InvalidReason::TooSmall(_))
        ));
        let body = pdf_body(50 * 1024);
        assert!(validator.validate(&body, None, ContentKind::Pdf).is_ok());
    }
}
