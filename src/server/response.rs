//! HTTP replies and their tiny_http encoding.

use tiny_http::{Header, Request, Response};

const ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";
const ALLOW_METHODS: &str = "GET, POST, OPTIONS";

/// A routed response, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    /// Reason phrase as the body, like `OK` or `Created`.
    pub fn status(status: u16) -> Self {
        Self::text(status, reason_phrase(status))
    }

    pub fn no_content() -> Self {
        Self::text(204, "")
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        _ => "Internal Server Error",
    }
}

/// Send `reply` with the CORS headers every response carries.
pub fn respond(request: Request, reply: Reply, allowed_origin: &str) -> std::io::Result<()> {
    let mut response = Response::from_string(reply.body).with_status_code(reply.status);

    let headers = [
        ("Content-Type", reply.content_type),
        ("Access-Control-Allow-Origin", allowed_origin),
        ("Access-Control-Allow-Headers", ALLOW_HEADERS),
        ("Access-Control-Allow-Methods", ALLOW_METHODS),
    ];
    for (name, value) in headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => tracing::warn!(header = name, value, "skipping invalid header"),
        }
    }

    request.respond(response)
}
