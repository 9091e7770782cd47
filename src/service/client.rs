use crate::common::paths::{DEV_SOCKET_PATH, SYSTEM_SOCKET_PATH};
use crate::common::Result;
use crate::core::enroll::EnrollmentRequest;
use crate::core::verify::VerificationRequest;
use crate::service::protocol::{read_frame, write_frame, Request, Response};
use rust_decimal::Decimal;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

/// Blocking client for the service socket. Each operation opens a fresh
/// connection and performs one request/response exchange.
pub struct ServiceClient {
    socket_path: PathBuf,
}

impl ServiceClient {
    pub fn new(dev_mode: bool) -> Self {
        let socket_path = if dev_mode {
            PathBuf::from(DEV_SOCKET_PATH)
        } else {
            PathBuf::from(SYSTEM_SOCKET_PATH)
        };
        Self { socket_path }
    }

    pub fn with_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn enroll(&self, request: EnrollmentRequest) -> Result<Response> {
        self.roundtrip(&Request::Enroll(request))
    }

    pub fn verify(&self, request: VerificationRequest) -> Result<Response> {
        self.roundtrip(&Request::Verify(request))
    }

    pub fn balance(&self, token: &str) -> Result<Response> {
        self.roundtrip(&Request::Balance {
            token: token.to_string(),
        })
    }

    pub fn deposit(&self, token: &str, amount: Decimal) -> Result<Response> {
        self.roundtrip(&Request::Deposit {
            token: token.to_string(),
            amount,
        })
    }

    pub fn transfer(&self, token: &str, to: &str, amount: Decimal) -> Result<Response> {
        self.roundtrip(&Request::Transfer {
            token: token.to_string(),
            to: to.to_string(),
            amount,
        })
    }

    pub fn pay(&self, token: &str, amount: Decimal) -> Result<Response> {
        self.roundtrip(&Request::Pay {
            token: token.to_string(),
            amount,
        })
    }

    pub fn logout(&self, token: &str) -> Result<Response> {
        self.roundtrip(&Request::Logout {
            token: token.to_string(),
        })
    }

    fn roundtrip(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect_with_retry(3)?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    fn connect_with_retry(&self, max_retries: u32) -> Result<UnixStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    // Verification can sit behind a cold model load
                    stream.set_read_timeout(Some(Duration::from_secs(120)))?;
                    stream.set_write_timeout(Some(Duration::from_secs(10)))?;
                    return Ok(stream);
                }
                Err(e) if attempt < max_retries => {
                    tracing::debug!("Failed to connect (attempt {}): {}", attempt, e);
                    std::thread::sleep(Duration::from_millis(500));
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Failed to connect to service at {:?}: {}",
                        self.socket_path,
                        e
                    )
                    .into());
                }
            }
        }
    }
}
