//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: health probes, route matching,
//! method validation, body limits, then dispatch to a parcel handler.

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{CONTENT_LENGTH, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::error::into_response;
use super::parcels::{self, ParcelRoute};
use crate::config::{AppState, HttpConfig};
use crate::http::{self, HttpResponse};
use crate::logger::{self, AccessLogEntry};
use crate::model::Payload;

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<HttpResponse, Infallible> {
    let started = Instant::now();
    let access_log = state.config.logging.access_log.then(|| {
        let mut entry = AccessLogEntry::new(
            peer_addr.ip().to_string(),
            req.method().to_string(),
            req.uri().path().to_string(),
        );
        entry.http_version = format!("{:?}", req.version())
            .trim_start_matches("HTTP/")
            .to_string();
        entry.user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        entry
    });

    let response = stamp_headers(serve(req, &state).await, &state.config.http);

    if let Some(mut entry) = access_log {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

async fn serve(req: Request<hyper::body::Incoming>, state: &AppState) -> HttpResponse {
    let (parts, body) = req.into_parts();

    let route = match resolve(&parts.method, parts.uri.path(), state).await {
        Resolved::Respond(response) => return response,
        Resolved::Parcel(route) => route,
    };

    // 1. Check declared body size before reading anything
    let max_body_size = state.config.http.max_body_size;
    if let Some(resp) = check_body_size(&parts.headers, max_body_size) {
        return resp;
    }

    // 2. Read the body, enforcing the same limit on chunked bodies
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_warning(&format!(
                "Request body exceeded {max_body_size} bytes on {}",
                route.name()
            ));
            return http::build_413_response();
        }
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            return http::build_text_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            );
        }
    };

    dispatch_parcel(route, &body, state).await
}

/// Outcome of matching method and path
enum Resolved {
    /// Answered without reading the body
    Respond(HttpResponse),
    Parcel(ParcelRoute),
}

async fn resolve(method: &Method, path: &str, state: &AppState) -> Resolved {
    // 0. Health check endpoints (highest priority)
    let health = &state.config.health;
    if health.enabled && (*method == Method::GET || *method == Method::HEAD) {
        if path == health.liveness_path {
            return Resolved::Respond(http::build_health_response(true));
        }
        if path == health.readiness_path {
            let ready = match state.store.ping().await {
                Ok(()) => true,
                Err(e) => {
                    logger::log_warning(&format!("Readiness check failed: {e}"));
                    false
                }
            };
            return Resolved::Respond(http::build_health_response(ready));
        }
    }

    // 1. Parcel routes
    let Some(route) = ParcelRoute::from_path(path) else {
        return Resolved::Respond(http::build_404_response());
    };

    // 2. Check HTTP method
    match *method {
        Method::POST => Resolved::Parcel(route),
        Method::OPTIONS => {
            Resolved::Respond(http::build_options_response(state.config.http.enable_cors))
        }
        _ => {
            logger::log_warning(&format!("Method not allowed: {method} {path}"));
            Resolved::Respond(http::build_405_response())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &hyper::HeaderMap, max_body_size: u64) -> Option<HttpResponse> {
    let content_length = headers.get(CONTENT_LENGTH)?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Headers carried by every response
fn stamp_headers(response: HttpResponse, config: &HttpConfig) -> HttpResponse {
    let response = http::with_server_name(response, &config.server_name);
    if config.enable_cors {
        http::with_cors(response)
    } else {
        response
    }
}

async fn dispatch_parcel(route: ParcelRoute, body: &Bytes, state: &AppState) -> HttpResponse {
    let payload = Payload::parse(body);
    into_response(parcels::dispatch(route, state.store.as_ref(), payload).await)
}
