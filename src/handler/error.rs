//! Handler outcome types
//!
//! Every parcel handler returns `Result<Reply, HandlerError>`; the variants map
//! one-to-one onto the status codes callers see.

use hyper::StatusCode;
use thiserror::Error;

use crate::http::{self, HttpResponse};
use crate::logger;
use crate::store::Document;

/// Body sent to callers on any internal error
pub const INTERNAL_ERROR_BODY: &str = "Error processing request";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Successful handler result
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// 200 with a short confirmation
    Text(&'static str),
    /// 200 with a full parcel document
    Json(Document),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    /// A required identifying field is absent
    #[error("{0}")]
    InvalidInput(&'static str),

    /// The referenced parcel does not exist
    #[error("{0}")]
    NotFound(&'static str),

    /// Any other fault; `context` names what the handler was doing
    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: BoxError,
    },
}

impl HandlerError {
    pub fn internal(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            context,
            source: source.into(),
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert a handler outcome into the response sent on the wire
///
/// Internal error details go to the error log only.
pub fn into_response(outcome: Result<Reply, HandlerError>) -> HttpResponse {
    match outcome {
        Ok(Reply::Text(text)) => http::build_text_response(StatusCode::OK, text),
        Ok(Reply::Json(document)) => http::build_json_response(StatusCode::OK, &document),
        Err(err @ HandlerError::Internal { .. }) => {
            logger::log_error(&err.to_string());
            http::build_text_response(err.status(), INTERNAL_ERROR_BODY)
        }
        Err(err) => http::build_text_response(err.status(), &err.to_string()),
    }
}
