pub mod codec;
pub mod enroll;
pub mod extractor;
pub mod matcher;
pub mod payload;
pub mod quality;
pub mod verify;

pub use enroll::{run_enrollment, EnrollmentOutcome, EnrollmentRejection, EnrollmentRequest};
pub use extractor::{
    BoundedExtractor, Descriptor, DescriptorExtractor, FaceBox, OnnxExtractor, DESCRIPTOR_LEN,
};
pub use verify::{
    run_verification, VerificationOutcome, VerificationRejection, VerificationRequest,
    VerifyPolicy,
};
