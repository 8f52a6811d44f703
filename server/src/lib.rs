//! Lupa Attachment Server
//!
//! Attachment storage for project and application records: validated,
//! virus-scanned uploads into S3-compatible object storage, background
//! migration of legacy inline content, and header repair for objects
//! written by older releases.

pub mod admin;
pub mod api;
pub mod attachment;
pub mod config;
pub mod db;
pub mod lock;
pub mod migration;
pub mod repair;
pub mod scan;
pub mod storage;
