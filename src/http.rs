//! HTTP API for the approval surface
//!
//! ## Endpoints
//! - `GET /health` - Health check
//! - `GET /approvals?priority=Critical|High|Medium&search=` - Pending cards for the caller
//! - `GET /approvals/{card_id}` - One card
//! - `POST /approvals/{card_id}/decide` - Body `{"action": "approve" | "reject"}`
//! - `GET /transfers/{transfer_id}` - Transfer record
//! - `GET /inventory/{facility_id}/{item_id}` - Stock row
//!
//! Caller identity comes from the authenticating proxy in `x-caller-id`,
//! `x-caller-role`, `x-caller-district` and `x-caller-facility` headers.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "Content-Type: application/json" \
//!      -d '{"action":"approve"}' \
//!      http://localhost:8095/approvals/6f1c.../decide
//! ```

use crate::db::{CallerContext, CardQuery, PriorityBand};
use crate::error::SupplyError;
use crate::services::response;
use crate::services::{ApprovalService, Decision};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// HTTP server state
pub struct HttpServer {
    approvals: Arc<ApprovalService>,
    bind_addr: SocketAddr,
    queue_limit: u32,
}

#[derive(Debug, Deserialize)]
struct DecideBody {
    action: String,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(approvals: Arc<ApprovalService>, bind_addr: SocketAddr) -> Self {
        Self {
            approvals,
            bind_addr,
            queue_limit: 100,
        }
    }

    /// Cap the number of cards returned by the queue
    pub fn with_queue_limit(mut self, limit: u32) -> Self {
        self.queue_limit = limit;
        self
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), SupplyError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (Method::GET, ["health"]) => Ok(response::ok(&serde_json::json!({ "status": "ok" }))),

            (Method::GET, ["approvals"]) => {
                let ctx = caller_context(req.headers());
                let query = req.uri().query().unwrap_or("").to_string();
                Ok(self.handle_queue(ctx, &query).await)
            }
            (Method::GET, ["approvals", card_id]) => Ok(self.handle_get_card(card_id).await),
            (Method::POST, ["approvals", card_id, "decide"]) => {
                let card_id = card_id.to_string();
                let body = req.into_body().collect().await?.to_bytes();
                Ok(self.handle_decide(card_id, &body).await)
            }

            (Method::GET, ["transfers", transfer_id]) => Ok(self.handle_get_transfer(transfer_id).await),

            (Method::GET, ["inventory", facility_id, item_id]) => {
                Ok(self.handle_get_inventory(facility_id, item_id).await)
            }

            (_, ["health"]) | (_, ["approvals", ..]) | (_, ["transfers", _]) | (_, ["inventory", _, _]) => {
                Ok(response::method_not_allowed())
            }

            _ => Ok(response::not_found("Not found")),
        }
    }

    async fn handle_queue(&self, ctx: CallerContext, query: &str) -> Response<Full<Bytes>> {
        let card_query = match parse_queue_query(query, self.queue_limit) {
            Ok(card_query) => card_query,
            Err(message) => return response::bad_request(&message),
        };

        let approvals = self.approvals.clone();
        run_blocking(move || approvals.queue(&ctx, &card_query), |cards| response::ok(&cards)).await
    }

    async fn handle_get_card(&self, card_id: &str) -> Response<Full<Bytes>> {
        let approvals = self.approvals.clone();
        let id = card_id.to_string();
        run_blocking(move || approvals.get_card(&id), |card| match card {
            Some(card) => response::ok(&card),
            None => response::not_found("Card not found"),
        })
        .await
    }

    async fn handle_get_transfer(&self, transfer_id: &str) -> Response<Full<Bytes>> {
        let approvals = self.approvals.clone();
        let id = transfer_id.to_string();
        run_blocking(move || approvals.get_transfer(&id), |transfer| match transfer {
            Some(transfer) => response::ok(&transfer),
            None => response::not_found("Transfer not found"),
        })
        .await
    }

    async fn handle_get_inventory(&self, facility_id: &str, item_id: &str) -> Response<Full<Bytes>> {
        let approvals = self.approvals.clone();
        let (facility_id, item_id) = (facility_id.to_string(), item_id.to_string());
        run_blocking(move || approvals.inventory(&facility_id, &item_id), |row| match row {
            Some(row) => response::ok(&row),
            None => response::not_found("No inventory for facility and item"),
        })
        .await
    }

    async fn handle_decide(&self, card_id: String, body: &[u8]) -> Response<Full<Bytes>> {
        let input: DecideBody = match serde_json::from_slice(body) {
            Ok(input) => input,
            Err(_) => return response::bad_request("Invalid JSON input"),
        };
        let Some(decision) = Decision::parse(&input.action) else {
            return response::bad_request(&format!("Unknown action: {}", input.action));
        };

        // The transaction runs to commit or rollback on the blocking pool even
        // if this request is dropped, so no lock outlives it.
        let approvals = self.approvals.clone();
        let joined = tokio::task::spawn_blocking(move || approvals.decide(&card_id, decision)).await;

        match joined {
            Ok(Ok(outcome)) => response::ok(&outcome),
            Ok(Err(e)) => response::approval_error_response(&e),
            Err(e) => {
                error!(error = %e, "Decision task failed");
                response::error_response(SupplyError::Internal(e.to_string()))
            }
        }
    }
}

/// Run a ledger read on the blocking pool and render it
async fn run_blocking<T, F, R>(f: F, render: R) -> Response<Full<Bytes>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SupplyError> + Send + 'static,
    R: FnOnce(T) -> Response<Full<Bytes>>,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => render(value),
        Ok(Err(e)) => response::error_response(e),
        Err(e) => response::error_response(SupplyError::Internal(e.to_string())),
    }
}

/// Parse `priority` and `search` from the queue query string
fn parse_queue_query(query: &str, limit: u32) -> Result<CardQuery, String> {
    let mut card_query = CardQuery {
        limit,
        ..Default::default()
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "priority" if !value.is_empty() && value != "All" => {
                card_query.priority = Some(
                    PriorityBand::parse(&value).ok_or_else(|| format!("Unknown priority: {}", value))?,
                );
            }
            "search" => card_query.search = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(card_query)
}

/// Read caller identity headers set by the auth proxy
fn caller_context(headers: &HeaderMap) -> CallerContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    CallerContext {
        user_id: header("x-caller-id"),
        role: header("x-caller-role").unwrap_or_default(),
        district: header("x-caller-district"),
        facility_id: header("x-caller-facility"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_caller_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-caller-role", HeaderValue::from_static("PHC_Staff"));
        headers.insert("x-caller-facility", HeaderValue::from_static("F1"));
        headers.insert("x-caller-district", HeaderValue::from_static(" "));

        let ctx = caller_context(&headers);
        assert_eq!(ctx.role, "PHC_Staff");
        assert_eq!(ctx.facility_id.as_deref(), Some("F1"));
        assert!(ctx.district.is_none());
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn test_queue_query_parsing() {
        let query = parse_queue_query("priority=Critical&search=Kothrud%20PHC", 25).unwrap();
        assert_eq!(query.priority, Some(PriorityBand::Critical));
        assert_eq!(query.search.as_deref(), Some("Kothrud PHC"));
        assert_eq!(query.limit, 25);

        let query = parse_queue_query("priority=All", 25).unwrap();
        assert!(query.priority.is_none());
        assert!(query.search.is_none());

        assert!(parse_queue_query("priority=Urgent", 25).is_err());
    }
}
