pub mod common;
pub mod core;
pub mod ledger;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, FaceBankError, Paths, Result};
pub use core::{
    BoundedExtractor, Descriptor, DescriptorExtractor, EnrollmentOutcome, EnrollmentRejection,
    EnrollmentRequest, FaceBox, OnnxExtractor, VerificationOutcome, VerificationRejection,
    VerificationRequest, VerifyPolicy, DESCRIPTOR_LEN,
};
pub use service::{ServiceClient, ServiceState, SessionManager};
pub use storage::{Account, AccountStore, FsAccountStore, MemoryAccountStore, UploadArchive};
