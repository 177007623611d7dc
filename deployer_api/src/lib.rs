#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;

#[macro_use]
extern crate log;

#[macro_use]
extern crate error_chain;

use actix_web::{HttpResponse, ResponseError};

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {
        Deployer(deployer::Error, deployer::ErrorKind);
    }
    foreign_links {
        Io(::std::io::Error);
        SerdeJ(serde_json::Error);
    }
}

/// Maps an [`ErrorKind`] onto an HTTP status and a short machine-readable
/// tag, so handlers can build the `{error, message, model_id, state_after}`
/// body of spec.md §7 without re-deriving this mapping themselves.
pub fn error_tag(e: &Error) -> (actix_web::http::StatusCode, &'static str) {
    use actix_web::http::StatusCode;
    match e.kind() {
        ErrorKind::Deployer(deployer::ErrorKind::Core(core)) => match core {
            deployer_core::ErrorKind::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            deployer_core::ErrorKind::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            deployer_core::ErrorKind::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            deployer_core::ErrorKind::PlacementNoFit(_) => (StatusCode::UNPROCESSABLE_ENTITY, "placement_no_fit"),
            deployer_core::ErrorKind::ExposureTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "exposure_timeout"),
            deployer_core::ErrorKind::PartialRollback(_) => (StatusCode::INTERNAL_SERVER_ERROR, "partial_rollback"),
            deployer_core::ErrorKind::TransientAPI(_) => (StatusCode::BAD_GATEWAY, "transient_api"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        },
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

/// Generic `{error, message}` body for errors that aren't produced inside a
/// `start`/`stop` handler (spec.md §6/§7; SPEC_FULL.md §10.3). The richer
/// `{error, message, model_id, state_after}` shape is assembled by the
/// handlers themselves, which are the only place the acted-on `model_id`
/// and the record's post-failure lifecycle state are both known.
impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        let (status, tag) = error_tag(self);
        warn!("request failed: {}", self);
        HttpResponse::build(status).json(ErrorBody { error: tag, message: self.to_string() })
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Long-lived application state: the `Orchestrator` and a handle to the
/// control plane's own presence registration (spec.md §9 "Global module
/// state becomes a `Config` value constructed at startup and injected").
pub mod state;

/// HTTP route handlers (spec.md §6 "HTTP surface of the control plane").
pub mod routes;

pub use crate::state::AppState;

pub use deployer_core::Config;
