//! Attachment Validation
//!
//! Pure checks on uploaded files. Everything here runs before the scan
//! service or object store is contacted.

use bytes::Bytes;
use lupa_common::AttachmentType;
use mime_guess::mime::Mime;
use thiserror::Error;

/// Maximum filename length in characters.
pub const MAX_FILE_NAME_LENGTH: usize = 128;

/// Punctuation accepted in filenames besides letters, digits and space.
const ALLOWED_PUNCTUATION: &str = ".-_()[]{}+,;'!&=@#$%~^";

/// `"` as it arrives percent-encoded from some clients.
const ENCODED_QUOTE: &str = "%22";

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Supported content types and the extensions each may carry.
const CONTENT_TYPES: &[(&str, &[&str])] = &[
    ("application/pdf", &["pdf"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("text/plain", &["txt"]),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        &["docx"],
    ),
    ("image/vnd.dwg", &["dwg"]),
    ("application/acad", &["dwg"]),
    ("image/vnd.dgn", &["dgn"]),
    ("application/octet-stream", &["dgn", "dwg", "gt"]),
];

/// Reasons an upload is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File name is blank")]
    Blank,

    #[error("File name is too long ({length} characters)")]
    TooLong { length: usize },

    #[error("File name must not contain a path: {0}")]
    PathTraversal(String),

    #[error("File name contains a disallowed character: {file_name}")]
    DisallowedCharacter { file_name: String },

    #[error("File name is reserved: {0}")]
    Reserved(String),

    #[error("Content-Type is missing")]
    MissingContentType,

    #[error("Invalid Content-Type: {0}")]
    InvalidContentType(String),

    #[error("Unsupported Content-Type: {0}")]
    UnsupportedContentType(String),

    #[error("File extension of {file_name} does not match Content-Type {content_type}")]
    ExtensionMismatch {
        file_name: String,
        content_type: String,
    },

    #[error("Attachment has no content")]
    Empty,

    #[error("File too large ({size} bytes, max: {max_size} bytes)")]
    TooLarge { size: usize, max_size: usize },

    #[error("File {file_name} is not allowed for attachment type {attachment_type}")]
    NotAllowedForType {
        file_name: String,
        attachment_type: AttachmentType,
    },

    #[error("Attachment type is required")]
    MissingAttachmentType,

    #[error("Attachment type is not supported here")]
    UnexpectedAttachmentType,

    #[error("Attachment limit reached ({limit} per owner)")]
    LimitReached { limit: usize },
}

impl ValidationError {
    /// Stable reason code for callers.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Blank => "FILE_NAME_BLANK",
            Self::TooLong { .. } => "FILE_NAME_TOO_LONG",
            Self::PathTraversal(_) => "FILE_NAME_PATH",
            Self::DisallowedCharacter { .. } => "FILE_NAME_CHARACTER",
            Self::Reserved(_) => "FILE_NAME_RESERVED",
            Self::MissingContentType => "CONTENT_TYPE_MISSING",
            Self::InvalidContentType(_) => "CONTENT_TYPE_INVALID",
            Self::UnsupportedContentType(_) => "CONTENT_TYPE_UNSUPPORTED",
            Self::ExtensionMismatch { .. } => "EXTENSION_MISMATCH",
            Self::Empty => "FILE_EMPTY",
            Self::TooLarge { .. } => "FILE_TOO_LARGE",
            Self::NotAllowedForType { .. } => "EXTENSION_NOT_ALLOWED_FOR_TYPE",
            Self::MissingAttachmentType => "ATTACHMENT_TYPE_MISSING",
            Self::UnexpectedAttachmentType => "ATTACHMENT_TYPE_UNEXPECTED",
            Self::LimitReached { .. } => "ATTACHMENT_LIMIT_REACHED",
        }
    }
}

/// A file as received from the uploader.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A file that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    /// Normalized filename.
    pub file_name: String,
    /// Lowercase content-type essence, parameters dropped.
    pub content_type: String,
    pub bytes: Bytes,
}

impl ValidatedFile {
    /// Content size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Upload validator holding the configured size ceiling and the number of
/// attachments one owner may have.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentValidator {
    max_size: usize,
    max_attachments: usize,
}

impl AttachmentValidator {
    #[must_use]
    pub const fn new(max_size: usize, max_attachments: usize) -> Self {
        Self {
            max_size,
            max_attachments,
        }
    }

    /// Reject a new attachment when the owner already has `existing` at or
    /// above the limit.
    pub fn check_count(&self, existing: i64) -> Result<(), ValidationError> {
        if usize::try_from(existing).unwrap_or(usize::MAX) >= self.max_attachments {
            return Err(ValidationError::LimitReached {
                limit: self.max_attachments,
            });
        }
        Ok(())
    }

    /// Validate name, content-type, extension and size.
    pub fn validate(&self, file: &UploadFile) -> Result<ValidatedFile, ValidationError> {
        let file_name = validate_file_name(&file.file_name)?;
        let content_type = normalize_content_type(file.content_type.as_deref())?;

        let allowed = allowed_extensions(&content_type)
            .ok_or_else(|| ValidationError::UnsupportedContentType(content_type.clone()))?;
        match extension(&file_name) {
            Some(ext) if allowed.contains(&ext.as_str()) => {}
            _ => {
                return Err(ValidationError::ExtensionMismatch {
                    file_name,
                    content_type,
                })
            }
        }

        if file.bytes.is_empty() {
            return Err(ValidationError::Empty);
        }
        if file.bytes.len() > self.max_size {
            return Err(ValidationError::TooLarge {
                size: file.bytes.len(),
                max_size: self.max_size,
            });
        }

        Ok(ValidatedFile {
            file_name,
            content_type,
            bytes: file.bytes.clone(),
        })
    }
}

/// Validate and normalize a filename.
///
/// Control characters, surrounding whitespace and trailing dots are
/// stripped; anything else outside the allow-list rejects the name.
pub fn validate_file_name(name: &str) -> Result<String, ValidationError> {
    let stripped: String = name.chars().filter(|c| !c.is_control()).collect();
    let normalized = stripped.trim().trim_end_matches(['.', ' ']).to_string();

    if normalized.is_empty() {
        return Err(ValidationError::Blank);
    }

    let length = normalized.chars().count();
    if length > MAX_FILE_NAME_LENGTH {
        return Err(ValidationError::TooLong { length });
    }

    if normalized.contains(['/', '\\']) || normalized.starts_with("..") {
        return Err(ValidationError::PathTraversal(normalized));
    }

    if normalized.contains(ENCODED_QUOTE)
        || !normalized
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || ALLOWED_PUNCTUATION.contains(c))
    {
        return Err(ValidationError::DisallowedCharacter {
            file_name: normalized,
        });
    }

    let stem = normalized.split('.').next().unwrap_or_default().trim_end();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        return Err(ValidationError::Reserved(normalized));
    }

    Ok(normalized)
}

/// Check that a file's extension is allowed for an attachment type.
pub fn validate_for_type(
    file_name: &str,
    attachment_type: AttachmentType,
) -> Result<(), ValidationError> {
    let allowed = match extension(file_name) {
        Some(ext) if attachment_type.requires_pdf() => ext == "pdf",
        Some(ext) => CONTENT_TYPES
            .iter()
            .any(|(_, extensions)| extensions.contains(&ext.as_str())),
        None => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(ValidationError::NotAllowedForType {
            file_name: file_name.to_string(),
            attachment_type,
        })
    }
}

fn normalize_content_type(content_type: Option<&str>) -> Result<String, ValidationError> {
    let raw = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .ok_or(ValidationError::MissingContentType)?;

    let mime: Mime = raw
        .parse()
        .map_err(|_| ValidationError::InvalidContentType(raw.to_string()))?;
    Ok(mime.essence_str().to_ascii_lowercase())
}

fn allowed_extensions(content_type: &str) -> Option<&'static [&'static str]> {
    CONTENT_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, extensions)| *extensions)
}

/// Lowercase extension after the last dot.
fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, content_type: Option<&str>, bytes: &'static [u8]) -> UploadFile {
        UploadFile {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn accepts_allowed_names() {
        for name in [
            "file.pdf",
            "Päätös (1).pdf",
            "a,b;c'd!e&f=g@h#i$j%k~l^m.txt",
            "[draft] {v2} + notes.docx",
            "x.gt",
        ] {
            assert_eq!(validate_file_name(name).as_deref(), Ok(name));
        }
    }

    #[test]
    fn name_at_limit_is_accepted() {
        let name = format!("{}.pdf", "a".repeat(MAX_FILE_NAME_LENGTH - 4));
        assert!(validate_file_name(&name).is_ok());

        let name = format!("{}.pdf", "ä".repeat(MAX_FILE_NAME_LENGTH - 4));
        assert!(validate_file_name(&name).is_ok());
    }

    #[test]
    fn name_over_limit_is_rejected() {
        let name = format!("{}.pdf", "a".repeat(MAX_FILE_NAME_LENGTH));
        assert_eq!(
            validate_file_name(&name),
            Err(ValidationError::TooLong {
                length: MAX_FILE_NAME_LENGTH + 4
            })
        );
    }

    #[test]
    fn normalizes_whitespace_and_trailing_dots() {
        assert_eq!(validate_file_name("  report.pdf. . ").as_deref(), Ok("report.pdf"));
        assert_eq!(validate_file_name("tab\tbed.pdf").as_deref(), Ok("tabbed.pdf"));
    }

    #[test]
    fn blank_names_are_rejected() {
        for name in ["", "   ", "...", "\u{0007}"] {
            assert_eq!(validate_file_name(name), Err(ValidationError::Blank));
        }
    }

    #[test]
    fn paths_are_rejected() {
        for name in ["../etc/passwd", "a/b.pdf", "a\\b.pdf", "..hidden.pdf"] {
            assert!(
                matches!(validate_file_name(name), Err(ValidationError::PathTraversal(_))),
                "{name} should be rejected as a path"
            );
        }
    }

    #[test]
    fn disallowed_characters_are_rejected() {
        for name in [
            "a:b.pdf", "a*b.pdf", "a?b.pdf", "a\"b.pdf", "a<b>.pdf", "a|b.pdf", "a%22b.pdf",
        ] {
            assert!(
                matches!(
                    validate_file_name(name),
                    Err(ValidationError::DisallowedCharacter { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn reserved_names_are_rejected() {
        for name in ["CON", "con.pdf", "Lpt1.txt", "nul.tar.gz", "COM9.png"] {
            assert!(
                matches!(validate_file_name(name), Err(ValidationError::Reserved(_))),
                "{name} should be reserved"
            );
        }
        assert!(validate_file_name("CONTRACT.pdf").is_ok());
        assert!(validate_file_name("COM10.pdf").is_ok());
    }

    #[test]
    fn validates_pdf() {
        let validator = AttachmentValidator::new(100, 20);
        let file = validator
            .validate(&upload("file.pdf", Some("application/pdf"), b"%PDF-"))
            .unwrap();
        assert_eq!(file.file_name, "file.pdf");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.size(), 5);
    }

    #[test]
    fn content_type_is_normalized() {
        let validator = AttachmentValidator::new(100, 20);
        let file = validator
            .validate(&upload("notes.TXT", Some("Text/Plain; charset=UTF-8"), b"hi"))
            .unwrap();
        assert_eq!(file.content_type, "text/plain");
    }

    #[test]
    fn content_type_problems_are_classified() {
        let validator = AttachmentValidator::new(100, 20);
        assert_eq!(
            validator.validate(&upload("a.pdf", None, b"x")).unwrap_err(),
            ValidationError::MissingContentType
        );
        assert_eq!(
            validator.validate(&upload("a.pdf", Some("  "), b"x")).unwrap_err(),
            ValidationError::MissingContentType
        );
        assert!(matches!(
            validator.validate(&upload("a.pdf", Some("pdf"), b"x")).unwrap_err(),
            ValidationError::InvalidContentType(_)
        ));
        assert_eq!(
            validator.validate(&upload("a.pdf", Some("text/html"), b"x")).unwrap_err(),
            ValidationError::UnsupportedContentType("text/html".into())
        );
    }

    #[test]
    fn extension_must_match_content_type() {
        let validator = AttachmentValidator::new(100, 20);
        assert!(matches!(
            validator
                .validate(&upload("a.png", Some("application/pdf"), b"x"))
                .unwrap_err(),
            ValidationError::ExtensionMismatch { .. }
        ));
        assert!(matches!(
            validator
                .validate(&upload("noextension", Some("application/pdf"), b"x"))
                .unwrap_err(),
            ValidationError::ExtensionMismatch { .. }
        ));
        assert!(validator
            .validate(&upload("plan.gt", Some("application/octet-stream"), b"x"))
            .is_ok());
        assert!(validator
            .validate(&upload("plan.dwg", Some("application/acad"), b"x"))
            .is_ok());
    }

    #[test]
    fn attachment_count_limit() {
        let validator = AttachmentValidator::new(100, 2);
        assert!(validator.check_count(0).is_ok());
        assert!(validator.check_count(1).is_ok());
        assert_eq!(
            validator.check_count(2).unwrap_err(),
            ValidationError::LimitReached { limit: 2 }
        );
        assert_eq!(
            ValidationError::LimitReached { limit: 2 }.reason(),
            "ATTACHMENT_LIMIT_REACHED"
        );
    }

    #[test]
    fn size_limits() {
        let validator = AttachmentValidator::new(4, 20);
        assert_eq!(
            validator
                .validate(&upload("a.txt", Some("text/plain"), b""))
                .unwrap_err(),
            ValidationError::Empty
        );
        assert_eq!(
            validator
                .validate(&upload("a.txt", Some("text/plain"), b"12345"))
                .unwrap_err(),
            ValidationError::TooLarge {
                size: 5,
                max_size: 4
            }
        );
        assert!(validator
            .validate(&upload("a.txt", Some("text/plain"), b"1234"))
            .is_ok());
    }

    #[test]
    fn pdf_only_types() {
        assert!(validate_for_type("a.pdf", AttachmentType::TrafficArrangement).is_ok());
        assert!(validate_for_type("a.PDF", AttachmentType::PowerOfAttorney).is_ok());
        assert!(validate_for_type("a.png", AttachmentType::PowerOfAttorney).is_err());
        assert!(validate_for_type("a.png", AttachmentType::Other).is_ok());
        assert!(validate_for_type("a.exe", AttachmentType::Other).is_err());
    }
}
