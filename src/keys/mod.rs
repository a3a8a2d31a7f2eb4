//! # Token Certificates
//!
//! Generation, parsing, caching and lifecycle of the signing and encryption
//! certificates shared by every instance of an issuer.

pub mod cache;
pub mod certificate;
pub mod clock;
pub mod credentials;
pub mod external;
pub mod generator;
pub mod manager;
pub mod types;

pub use cache::{CachedCertificate, InMemoryCertificateCache};
pub use certificate::{Certificate, KeyUsage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{
    CredentialsProvider, EncryptionCredential, SigningCredential, ValidationKey,
    ENCRYPTION_ALGORITHM, SIGNING_ALGORITHM,
};
pub use external::{load_external_certificate, CertificateInfo, ExternalCertificate};
pub use generator::{
    key_usages, CertificateGenerator, SelfSignedGenerator, CLOCK_SKEW_TOLERANCE_DAYS,
};
pub use manager::KeyManager;
pub use types::{CertificateKey, CertificateRecord, CertificateType, ConcurrencyToken};
