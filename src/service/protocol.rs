use crate::common::Result;
use crate::core::enroll::{EnrollmentRejection, EnrollmentRequest};
use crate::core::verify::{VerificationRejection, VerificationRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// Hard cap on a single frame. A webcam capture re-encoded as a data URL fits
/// comfortably; anything bigger is garbage.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Request {
    Enroll(EnrollmentRequest),
    Verify(VerificationRequest),
    Balance {
        token: String,
    },
    Deposit {
        token: String,
        amount: Decimal,
    },
    Transfer {
        token: String,
        to: String,
        amount: Decimal,
    },
    Pay {
        token: String,
        amount: Decimal,
    },
    Logout {
        token: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Response {
    Enrolled { identifier: String },
    EnrollmentRejected(EnrollmentRejection),
    Granted { identifier: String, token: String },
    VerificationDenied(VerificationRejection),
    Balance { balance: Decimal },
    LoggedOut,
    Denied(AccessDenial),
    Error(String),
}

/// Denials for operations behind a session token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum AccessDenial {
    NotAuthenticated,
    UnknownAccount(String),
    InsufficientFunds,
    InvalidAmount(String),
    SelfTransfer,
}

impl fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "Session expired or invalid. Please log in again."),
            Self::UnknownAccount(identifier) => write!(f, "No account found for {}", identifier),
            Self::InsufficientFunds => write!(f, "Insufficient funds"),
            Self::InvalidAmount(reason) => write!(f, "Invalid amount: {}", reason),
            Self::SelfTransfer => write!(f, "Cannot transfer to your own account"),
        }
    }
}

/// Writes one message: little-endian u32 length, then bincode.
pub fn write_frame<T: Serialize>(stream: &mut impl Write, message: &T) -> Result<()> {
    let bytes = bincode::serialize(message)
        .map_err(|e| anyhow::anyhow!("Failed to serialize message: {}", e))?;
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(anyhow::anyhow!("Refusing to send a {} byte frame", bytes.len()).into());
    }
    stream.write_all(&(bytes.len() as u32).to_le_bytes())?;
    stream.write_all(&bytes)?;
    stream.flush()?;
    Ok(())
}

/// Reads one length-prefixed message, refusing oversized frames before
/// allocating for them.
pub fn read_frame<T: for<'de> Deserialize<'de>>(stream: &mut impl Read) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(anyhow::anyhow!(
            "Frame of {} bytes exceeds the {} byte limit",
            len,
            MAX_FRAME_BYTES
        )
        .into());
    }

    let mut bytes = vec![0u8; len];
    stream.read_exact(&mut bytes)?;
    let message = bincode::deserialize(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to deserialize message: {}", e))?;
    Ok(message)
}
