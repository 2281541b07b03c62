//! Turns a parsed request into a response: authentication gate, path to
//! service, SOAP action to operation, then dispatch.

use std::net::SocketAddr;

use crate::error::Error;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::server::state::AppState;
use crate::soap;

const SERVICE_PREFIX: &str = "/onvif/";

/// Maps `/onvif/<name>_service` or `/onvif/<name>` to `<name>`.
pub fn service_from_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(SERVICE_PREFIX)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let name = rest.strip_suffix("_service").unwrap_or(rest);
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name)
}

pub fn route(state: &AppState, request: &Request, peer: SocketAddr) -> Response {
    if let Some(auth) = &state.auth {
        match auth.authenticate(request) {
            Ok(username) => {
                tracing::debug!(peer = %peer, username = %username, "Authenticated");
            }
            Err(e) => {
                if request.headers.contains("Authorization") {
                    tracing::warn!(peer = %peer, reason = %e, "Authentication failed");
                }
                return match auth.challenge() {
                    Ok(challenge) => Response::unauthorized(challenge),
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot issue digest challenge");
                        Response::internal_error()
                    }
                };
            }
        }
    }

    let Some(service) = service_from_path(request.path()) else {
        tracing::debug!(peer = %peer, path = request.path(), "No service at path");
        return Response::not_found();
    };
    if !state.dispatcher.has_service(service) {
        tracing::debug!(peer = %peer, service, "Service not registered");
        return Response::not_found();
    }

    let Some(operation) = soap::extract_action(request) else {
        tracing::warn!(peer = %peer, service, "Request names no SOAP action");
        return Response::error(StatusCode::BadRequest);
    };

    match state.dispatcher.dispatch(service, &operation, request) {
        Ok(response) => response,
        Err(e) => {
            log_failure(peer, service, &operation, &e);
            fault_response(&e)
        }
    }
}

/// SOAP fault carrying the error's status code.
pub fn fault_response(error: &Error) -> Response {
    ResponseBuilder::new(error.status())
        .header("Content-Type", soap::SOAP_CONTENT_TYPE)
        .body(soap::error_fault(error))
        .build()
}

fn log_failure(peer: SocketAddr, service: &str, operation: &str, error: &Error) {
    match error {
        Error::Internal(_) => {
            tracing::error!(peer = %peer, service, operation, error = %error, "Operation failed")
        }
        _ => tracing::warn!(peer = %peer, service, operation, error = %error, "Operation rejected"),
    }
}
