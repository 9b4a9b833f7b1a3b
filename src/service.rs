//! HTTP persistence service exposing the document store.
//!
//! A deliberately small surface: `GET /api/health`, and `GET`/`PUT` on
//! `/api/tasks` with an optional `?project=` key. Requests are served one
//! at a time on a blocking accept loop; writes go through the same
//! `DocumentStore` checks as every other caller, so a bad document is
//! rejected with a 400 and nothing on disk changes.

use std::io::Read;

use serde_json::{json, Value};
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::docstore::{DocumentStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("could not bind service: {0}")]
    Bind(String),
}

/// The persistence service: a bound listener plus its backing store.
pub struct PersistService {
    server: Server,
    store: DocumentStore,
}

impl PersistService {
    pub fn bind(addr: &str, store: DocumentStore) -> Result<PersistService, ServiceError> {
        let server = Server::http(addr).map_err(|e| ServiceError::Bind(format!("{addr}: {e}")))?;
        Ok(PersistService { server, store })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve requests until the process ends, one request at a time.
    pub fn run(&self) {
        loop {
            match self.server.recv() {
                Ok(request) => self.handle(request),
                Err(e) => tracing::error!("could not accept request: {e}"),
            }
        }
    }

    fn handle(&self, mut request: Request) {
        let method = request.method().clone();
        let url = request.url().to_string();
        tracing::info!("{method} {url}");

        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, query),
            None => (url.as_str(), ""),
        };
        let project = query_param(query, "project").unwrap_or_default();

        let response = match (&method, path) {
            (Method::Get, "/api/health") => json_response(200, &json!({"status": "ok"})),
            (Method::Get, "/api/tasks") => self.get_tasks(&project),
            (Method::Put, "/api/tasks") => self.put_tasks(&mut request, &project),
            (_, "/api/health") | (_, "/api/tasks") => {
                error_response(405, &format!("{method} is not supported here"))
            }
            _ => error_response(404, &format!("no such endpoint: {path}")),
        };
        if let Err(e) = request.respond(response) {
            tracing::warn!("could not send response: {e}");
        }
    }

    fn get_tasks(&self, project: &str) -> Response<std::io::Cursor<Vec<u8>>> {
        match self.store.read(project) {
            Ok(document) => Response::from_string(document)
                .with_status_code(200)
                .with_header(json_header()),
            Err(e @ StoreError::NotFound(_)) => error_response(404, &e.to_string()),
            Err(e) => {
                tracing::error!("read failed: {e}");
                error_response(500, "could not read the stored document")
            }
        }
    }

    fn put_tasks(&self, request: &mut Request, project: &str) -> Response<std::io::Cursor<Vec<u8>>> {
        let mut body = String::new();
        if let Err(e) = request.as_reader().read_to_string(&mut body) {
            return error_response(400, &format!("could not read request body: {e}"));
        }
        let document: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(e) => return error_response(400, &format!("body is not valid JSON: {e}")),
        };
        match self.store.write(project, &document) {
            Ok(outcome) => json_response(200, &json!({"ok": true, "tasks": outcome.task_count})),
            Err(e @ (StoreError::TasksNotList | StoreError::DuplicateIds(_))) => {
                error_response(400, &e.to_string())
            }
            Err(e) => {
                tracing::error!("write failed: {e}");
                error_response(500, "could not store the document")
            }
        }
    }
}

fn query_param(query: &str, wanted: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == wanted && !value.is_empty()).then(|| value.to_string())
    })
}

fn json_header() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
}

fn json_response(status: u16, body: &Value) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(json_header())
}

fn error_response(status: u16, message: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    json_response(status, &json!({"error": message}))
}
