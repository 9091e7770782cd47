use crate::common::{FaceBankError, Result};
use crate::core::enroll::{run_enrollment, EnrollmentOutcome, EnrollmentRequest};
use crate::core::extractor::DescriptorExtractor;
use crate::core::verify::{run_verification, VerificationOutcome, VerificationRequest, VerifyPolicy};
use crate::ledger;
use crate::service::protocol::{read_frame, write_frame, AccessDenial, Request, Response};
use crate::service::session::SessionManager;
use crate::storage::{AccountStore, UploadArchive};
use rust_decimal::Decimal;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

/// Everything a connection handler needs, shared across all connections.
/// Models load once at startup and live here.
pub struct ServiceState {
    pub extractor: Arc<dyn DescriptorExtractor>,
    pub store: Arc<dyn AccountStore>,
    pub sessions: SessionManager,
    pub uploads: Option<UploadArchive>,
    pub verify_policy: VerifyPolicy,
}

/// One request in, one response out. Expected rejections become typed
/// responses; infrastructure faults are logged here and collapse to a
/// generic `Error` on the wire.
pub fn handle_request(state: &ServiceState, request: Request) -> Response {
    match request {
        Request::Enroll(enrollment) => handle_enroll(state, &enrollment),
        Request::Verify(verification) => handle_verify(state, &verification),
        Request::Balance { token } => match resolve_session(state, &token) {
            Ok(identifier) => handle_balance(state, &identifier),
            Err(denied) => denied,
        },
        Request::Deposit { token, amount } => match resolve_session(state, &token) {
            Ok(identifier) => {
                ledger_response(ledger::deposit(state.store.as_ref(), &identifier, amount))
            }
            Err(denied) => denied,
        },
        Request::Transfer { token, to, amount } => match resolve_session(state, &token) {
            Ok(identifier) => ledger_response(ledger::transfer(
                state.store.as_ref(),
                &identifier,
                to.trim(),
                amount,
            )),
            Err(denied) => denied,
        },
        Request::Pay { token, amount } => match resolve_session(state, &token) {
            Ok(identifier) => {
                ledger_response(ledger::pay(state.store.as_ref(), &identifier, amount))
            }
            Err(denied) => denied,
        },
        Request::Logout { token } => match state.sessions.revoke(&token) {
            Ok(()) => Response::LoggedOut,
            Err(e) => internal_error(e),
        },
    }
}

fn handle_enroll(state: &ServiceState, request: &EnrollmentRequest) -> Response {
    match run_enrollment(
        request,
        state.extractor.as_ref(),
        state.store.as_ref(),
        state.uploads.as_ref(),
    ) {
        Ok(EnrollmentOutcome::Enrolled { identifier }) => Response::Enrolled { identifier },
        Ok(EnrollmentOutcome::Rejected(rejection)) => Response::EnrollmentRejected(rejection),
        Err(e) => internal_error(e),
    }
}

fn handle_verify(state: &ServiceState, request: &VerificationRequest) -> Response {
    match run_verification(
        request,
        state.extractor.as_ref(),
        state.store.as_ref(),
        state.verify_policy,
    ) {
        Ok(VerificationOutcome::Granted { identifier }) => {
            match state.sessions.mint(&identifier) {
                Ok(token) => Response::Granted { identifier, token },
                Err(e) => internal_error(e),
            }
        }
        Ok(VerificationOutcome::Denied(rejection)) => Response::VerificationDenied(rejection),
        Err(e) => internal_error(e),
    }
}

fn handle_balance(state: &ServiceState, identifier: &str) -> Response {
    match state.store.find_by_identifier(identifier) {
        Ok(Some(account)) => Response::Balance {
            balance: account.balance,
        },
        Ok(None) => Response::Denied(AccessDenial::UnknownAccount(identifier.to_string())),
        Err(e) => internal_error(e),
    }
}

fn resolve_session(state: &ServiceState, token: &str) -> std::result::Result<String, Response> {
    match state.sessions.resolve(token) {
        Ok(Some(identifier)) => Ok(identifier),
        Ok(None) => Err(Response::Denied(AccessDenial::NotAuthenticated)),
        Err(e) => Err(internal_error(e)),
    }
}

fn ledger_response(result: Result<Decimal>) -> Response {
    match result {
        Ok(balance) => Response::Balance { balance },
        Err(FaceBankError::InsufficientFunds { .. }) => {
            Response::Denied(AccessDenial::InsufficientFunds)
        }
        Err(FaceBankError::InvalidAmount(reason)) => {
            Response::Denied(AccessDenial::InvalidAmount(reason))
        }
        Err(FaceBankError::SelfTransfer) => Response::Denied(AccessDenial::SelfTransfer),
        Err(FaceBankError::AccountNotFound(identifier)) => {
            Response::Denied(AccessDenial::UnknownAccount(identifier))
        }
        Err(e) => internal_error(e),
    }
}

/// Log the details, keep the wire generic.
fn internal_error(e: FaceBankError) -> Response {
    tracing::error!("Request failed: {}", e);
    Response::Error("Internal service error".to_string())
}

/// Runs one request/response exchange and closes. Clients reconnect per
/// operation.
pub fn serve_connection(mut stream: UnixStream, state: Arc<ServiceState>) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;

    let request: Request = read_frame(&mut stream)?;
    let response = handle_request(&state, request);
    write_frame(&mut stream, &response)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::Descriptor;
    use crate::storage::{Account, MemoryAccountStore};
    use image::DynamicImage;
    use std::str::FromStr;

    struct NullExtractor;

    impl DescriptorExtractor for NullExtractor {
        fn extract(&self, _image: &DynamicImage) -> Result<Vec<Descriptor>> {
            Ok(vec![])
        }

        fn detect_presence(&self, _image: &DynamicImage) -> Result<bool> {
            Ok(true)
        }
    }

    fn test_state() -> ServiceState {
        ServiceState {
            extractor: Arc::new(NullExtractor),
            store: Arc::new(MemoryAccountStore::new()),
            sessions: SessionManager::new(Duration::from_secs(60)),
            uploads: None,
            verify_policy: VerifyPolicy {
                tolerance: 0.6,
                presence_check: false,
            },
        }
    }

    #[test]
    fn unknown_token_is_not_authenticated() {
        let state = test_state();
        let response = handle_request(
            &state,
            Request::Balance {
                token: "bogus.tag".to_string(),
            },
        );
        assert!(matches!(
            response,
            Response::Denied(AccessDenial::NotAuthenticated)
        ));
    }

    #[test]
    fn minted_token_reads_the_balance() {
        let state = test_state();
        state
            .store
            .create(&Account::new(
                "5551234567".to_string(),
                "Ada".to_string(),
                "1990-01-01".to_string(),
                None,
            ))
            .unwrap();
        let token = state.sessions.mint("5551234567").unwrap();

        let response = handle_request(&state, Request::Balance { token });
        match response {
            Response::Balance { balance } => assert_eq!(balance, Decimal::ZERO),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn ledger_failures_map_to_denials() {
        let insufficient = ledger_response(Err(FaceBankError::InsufficientFunds {
            balance: Decimal::ZERO,
            requested: Decimal::from_str("1.00").unwrap(),
        }));
        assert!(matches!(
            insufficient,
            Response::Denied(AccessDenial::InsufficientFunds)
        ));

        let invalid = ledger_response(Err(FaceBankError::InvalidAmount("test".to_string())));
        assert!(matches!(
            invalid,
            Response::Denied(AccessDenial::InvalidAmount(_))
        ));

        let to_self = ledger_response(Err(FaceBankError::SelfTransfer));
        assert!(matches!(to_self, Response::Denied(AccessDenial::SelfTransfer)));

        let missing = ledger_response(Err(FaceBankError::AccountNotFound("555".to_string())));
        assert!(matches!(
            missing,
            Response::Denied(AccessDenial::UnknownAccount(id)) if id == "555"
        ));
    }

    #[test]
    fn infrastructure_faults_stay_generic_on_the_wire() {
        let response = ledger_response(Err(FaceBankError::Storage(
            "accounts dir on fire".to_string(),
        )));
        match response {
            Response::Error(message) => assert_eq!(message, "Internal service error"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn logout_with_junk_token_still_succeeds() {
        let state = test_state();
        let response = handle_request(
            &state,
            Request::Logout {
                token: "junk".to_string(),
            },
        );
        assert!(matches!(response, Response::LoggedOut));
    }
}
