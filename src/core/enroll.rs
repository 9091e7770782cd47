use crate::common::{FaceBankError, Result};
use crate::core::codec;
use crate::core::extractor::DescriptorExtractor;
use crate::core::payload::decode_data_url;
use crate::storage::{validate_identifier, Account, AccountStore, UploadArchive};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub identifier: String,
    pub display_name: String,
    pub date_of_birth: String,
    /// Captured image as a base64 data URL.
    pub image_payload: String,
}

/// Why an enrollment was turned away. These are user-facing outcomes, not
/// errors; the flow returns `Err` only for infrastructure faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentRejection {
    MissingFields,
    InvalidIdentifier,
    AlreadyRegistered,
    MalformedImage,
    NoFaceFound,
    MultipleFacesFound,
    /// A racing enrollment claimed the identifier between our existence check
    /// and the create.
    DuplicateIdentifier,
}

impl fmt::Display for EnrollmentRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::MissingFields => "All fields are required",
            Self::InvalidIdentifier => "Invalid phone number. Use digits only.",
            Self::AlreadyRegistered | Self::DuplicateIdentifier => {
                "Phone number already registered. Please log in."
            }
            Self::MalformedImage => "Could not read the captured image. Please try again.",
            Self::NoFaceFound => "No face detected in the image. Please try again.",
            Self::MultipleFacesFound => {
                "Multiple faces detected. Please ensure only one person is in the frame."
            }
        };
        write!(f, "{}", message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EnrollmentOutcome {
    Enrolled { identifier: String },
    Rejected(EnrollmentRejection),
}

/// Enrolls a new account from a single capture. Checks run cheapest first;
/// the extractor is only consulted once the identifier is free.
pub fn run_enrollment(
    request: &EnrollmentRequest,
    extractor: &dyn DescriptorExtractor,
    store: &dyn AccountStore,
    uploads: Option<&UploadArchive>,
) -> Result<EnrollmentOutcome> {
    let identifier = request.identifier.trim();
    let display_name = request.display_name.trim();
    let date_of_birth = request.date_of_birth.trim();

    if identifier.is_empty()
        || display_name.is_empty()
        || date_of_birth.is_empty()
        || request.image_payload.trim().is_empty()
    {
        return Ok(EnrollmentOutcome::Rejected(
            EnrollmentRejection::MissingFields,
        ));
    }

    if !validate_identifier(identifier) {
        return Ok(EnrollmentOutcome::Rejected(
            EnrollmentRejection::InvalidIdentifier,
        ));
    }

    if store.find_by_identifier(identifier)?.is_some() {
        return Ok(EnrollmentOutcome::Rejected(
            EnrollmentRejection::AlreadyRegistered,
        ));
    }

    let image = match decode_data_url(&request.image_payload) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!("Rejecting enrollment image: {}", e);
            return Ok(EnrollmentOutcome::Rejected(
                EnrollmentRejection::MalformedImage,
            ));
        }
    };

    let descriptors = match extractor.extract(&image) {
        Ok(descriptors) => descriptors,
        Err(FaceBankError::ExtractionTimeout(ms)) => {
            tracing::warn!("Extraction timed out after {}ms during enrollment", ms);
            return Ok(EnrollmentOutcome::Rejected(EnrollmentRejection::NoFaceFound));
        }
        Err(e) => return Err(e),
    };

    let descriptor = match descriptors.as_slice() {
        [] => {
            return Ok(EnrollmentOutcome::Rejected(EnrollmentRejection::NoFaceFound));
        }
        [only] => only,
        _ => {
            tracing::debug!("Found {} faces in enrollment image", descriptors.len());
            return Ok(EnrollmentOutcome::Rejected(
                EnrollmentRejection::MultipleFacesFound,
            ));
        }
    };

    let descriptor_json = codec::encode(descriptor)?;
    let account = Account::new(
        identifier.to_string(),
        display_name.to_string(),
        date_of_birth.to_string(),
        Some(descriptor_json),
    );

    match store.create(&account) {
        Ok(()) => {}
        Err(FaceBankError::DuplicateIdentifier(id)) => {
            tracing::warn!("Lost enrollment race for {}", id);
            return Ok(EnrollmentOutcome::Rejected(
                EnrollmentRejection::DuplicateIdentifier,
            ));
        }
        Err(e) => return Err(e),
    }

    // The account is already durable; losing the raw capture is not worth
    // failing the enrollment over.
    if let Some(archive) = uploads {
        if let Err(e) = archive.save_capture(&format!("reg_{}", identifier), &image) {
            tracing::warn!("Failed to archive enrollment capture: {}", e);
        }
    }

    tracing::info!("Enrolled account {}", identifier);
    Ok(EnrollmentOutcome::Enrolled {
        identifier: identifier.to_string(),
    })
}
