//! Repository modules for data access

pub mod certificate;

pub use certificate::{CertificateStore, InsertOutcome, ReplaceOutcome, SqlxCertificateStore};
