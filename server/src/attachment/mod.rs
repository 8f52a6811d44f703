//! Attachments
//!
//! Upload validation, the scan gate, metadata repositories and the
//! per-family service.

mod error;
pub mod family;
mod memory;
mod postgres;
pub mod repository;
pub mod scan_pipeline;
mod service;
pub mod validator;

pub use error::AttachmentError;
pub use family::{ApplicationFamily, AttachmentFamily, ProjectFamily};
pub use memory::MemoryAttachmentRepository;
pub use postgres::PgAttachmentRepository;
pub use repository::{
    AttachmentRepository, InlineAttachment, NewAttachment, RepositoryError, StoredContent,
};
pub use service::AttachmentService;
pub use validator::{AttachmentValidator, UploadFile, ValidatedFile, ValidationError};
