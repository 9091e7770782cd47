use crate::common::{FaceBankError, Result};
use crate::core::codec;
use crate::core::extractor::DescriptorExtractor;
use crate::core::matcher;
use crate::core::payload::decode_data_url;
use crate::storage::AccountStore;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub identifier: String,
    /// Captured image as a base64 data URL.
    pub image_payload: String,
}

/// Why access was denied. Uniform on the wire: none of these carry distances
/// or thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationRejection {
    UnknownIdentifier,
    NoFaceCaptured,
    MalformedImage,
    FaceObscured,
    NoFaceFound,
    MultipleFacesFound,
    FaceMismatch,
}

impl fmt::Display for VerificationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::UnknownIdentifier => "Phone number not registered. Please register.",
            Self::NoFaceCaptured => "No image captured",
            Self::MalformedImage => "Could not read the captured image. Please try again.",
            Self::FaceObscured => "No complete face detected or face is covered",
            Self::NoFaceFound => "No face detected in the image. Please try again.",
            Self::MultipleFacesFound => {
                "Multiple faces detected. Please ensure only one person is in the frame."
            }
            Self::FaceMismatch => "Face not recognized. Please try again.",
        };
        write!(f, "{}", message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VerificationOutcome {
    Granted { identifier: String },
    Denied(VerificationRejection),
}

/// Knobs the service fixes per deployment, not per request.
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub tolerance: f64,
    pub presence_check: bool,
}

/// Verifies a capture against the enrolled descriptor for `identifier`.
/// A stored descriptor that fails to decode is an infrastructure fault and
/// surfaces as `Err`, never as a normal denial.
pub fn run_verification(
    request: &VerificationRequest,
    extractor: &dyn DescriptorExtractor,
    store: &dyn AccountStore,
    policy: VerifyPolicy,
) -> Result<VerificationOutcome> {
    let identifier = request.identifier.trim();

    let account = match store.find_by_identifier(identifier)? {
        Some(account) => account,
        None => {
            return Ok(VerificationOutcome::Denied(
                VerificationRejection::UnknownIdentifier,
            ))
        }
    };

    if request.image_payload.trim().is_empty() {
        return Ok(VerificationOutcome::Denied(
            VerificationRejection::NoFaceCaptured,
        ));
    }

    let image = match decode_data_url(&request.image_payload) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!("Rejecting verification image: {}", e);
            return Ok(VerificationOutcome::Denied(
                VerificationRejection::MalformedImage,
            ));
        }
    };

    // Advisory pre-check: a broken presence model must not lock everyone out
    if policy.presence_check {
        match extractor.detect_presence(&image) {
            Ok(true) => {}
            Ok(false) => {
                return Ok(VerificationOutcome::Denied(
                    VerificationRejection::FaceObscured,
                ))
            }
            Err(e) => {
                tracing::warn!("Presence pre-check failed, continuing with extraction: {}", e);
            }
        }
    }

    let descriptors = match extractor.extract(&image) {
        Ok(descriptors) => descriptors,
        Err(FaceBankError::ExtractionTimeout(ms)) => {
            tracing::warn!("Extraction timed out after {}ms during verification", ms);
            return Ok(VerificationOutcome::Denied(
                VerificationRejection::NoFaceFound,
            ));
        }
        Err(e) => return Err(e),
    };

    let candidate = match descriptors.as_slice() {
        [] => {
            return Ok(VerificationOutcome::Denied(
                VerificationRejection::NoFaceFound,
            ))
        }
        [only] => only,
        _ => {
            tracing::debug!("Found {} faces in verification image", descriptors.len());
            return Ok(VerificationOutcome::Denied(
                VerificationRejection::MultipleFacesFound,
            ));
        }
    };

    let stored = match account.descriptor_json.as_deref() {
        Some(json) => codec::decode(json)?,
        None => None,
    };

    if matcher::matches(stored.as_deref(), Some(candidate.as_slice()), policy.tolerance) {
        tracing::info!("Verified {}", identifier);
        Ok(VerificationOutcome::Granted {
            identifier: identifier.to_string(),
        })
    } else {
        // The measured distance stays out of logs and responses
        tracing::debug!("Descriptor mismatch for {}", identifier);
        Ok(VerificationOutcome::Denied(
            VerificationRejection::FaceMismatch,
        ))
    }
}
