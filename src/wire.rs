//! Wire format of the webapi: URLs, query strings, multipart upload bodies and
//! response envelopes. Everything here is pure so it can be checked without a
//! server.

use crate::client::Protocol;
use crate::client::SynoError::{self, Api, InvalidResponse, Timeout, Transport};
use crate::entities::{ApiResponse, FilePayload, Params, SynologyResponse};
use crate::utils::describe_error;
use serde_json::Value;
use std::time::Duration;

/// Parameters that route an upload; they travel in the query string, never in the body
pub const ROUTING_PARAMS: [&str; 4] = ["api", "method", "version", "_sid"];

const EOL: &str = "\r\n";

#[must_use]
pub fn base_url(protocol: Protocol, host: &str, port: u16) -> String {
    format!("{}://{host}:{port}/webapi/", protocol.scheme())
}

#[must_use]
pub fn query_string<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Builds `{base}{path}?{query}`
#[must_use]
pub fn request_url(base: &str, path: &str, params: &Params) -> String {
    let path = path.trim_start_matches('/');
    format!("{base}{path}?{}", query_string(params.iter()))
}

/// Splits upload parameters into the routing ones and the form fields
#[must_use]
pub fn split_routing(params: &Params) -> (Params, Params) {
    let (routing, fields): (Vec<_>, Vec<_>) = params
        .iter()
        .partition(|(key, _)| ROUTING_PARAMS.contains(key));
    (Params::from(routing), Params::from(fields))
}

#[must_use]
pub fn new_boundary() -> String {
    format!("SynoBoundary{}", uuid::Uuid::new_v4().simple())
}

#[must_use]
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Encodes a `multipart/form-data` body: one part per field, then the file part
/// named `file`, then the closing delimiter.
#[must_use]
pub fn multipart_body(boundary: &str, fields: &Params, file: &FilePayload) -> Vec<u8> {
    let delimiter = format!("--{boundary}");
    let mut body = Vec::with_capacity(file.len() + 256 * (fields.len() + 1));

    for (name, content) in fields.iter() {
        body.extend_from_slice(
            format!(
                "{delimiter}{EOL}Content-Disposition: form-data; name=\"{name}\"{EOL}{EOL}{content}{EOL}"
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(
        format!(
            "{delimiter}{EOL}Content-Disposition: form-data; name=\"file\"; filename=\"{}\"{EOL}Content-Type: application/octet-stream{EOL}{EOL}",
            file.filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(&file.content);
    body.extend_from_slice(EOL.as_bytes());
    body.extend_from_slice(format!("{delimiter}--{EOL}").as_bytes());

    body
}

/// Whether a content type carries an envelope (or at least text) rather than raw bytes
#[must_use]
pub fn is_textual(content_type: &str) -> bool {
    ["plain", "text", "json"]
        .iter()
        .any(|kind| content_type.contains(kind))
}

/// Maps a raw HTTP response to the call outcome.
///
/// # Errors
///
/// Returns an error if:
/// - The status isn't 200 (`Timeout` once `elapsed` reached `timeout`, `Transport` before)
/// - The envelope reports a failure
/// - The body is JSON but not an envelope
pub fn interpret_response(
    status: u16,
    content_type: &str,
    elapsed: Duration,
    timeout: Duration,
    body: Vec<u8>,
) -> Result<ApiResponse, SynoError> {
    if status != 200 {
        if elapsed >= timeout {
            return Err(Timeout { elapsed });
        }
        return Err(Transport {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    if is_textual(content_type) {
        parse_envelope(&String::from_utf8_lossy(&body))
    } else {
        Ok(ApiResponse::Binary(body))
    }
}

/// Decodes the `{success, data, error}` envelope.
///
/// # Errors
///
/// Returns an error if:
/// - `success` is false, with the message of the common error table
/// - The body is JSON but doesn't have the envelope shape
pub fn parse_envelope(body: &str) -> Result<ApiResponse, SynoError> {
    let Ok(value) = serde_json::from_str::<Value>(body.trim()) else {
        return Ok(ApiResponse::Text(body.to_string()));
    };

    let envelope = serde_json::from_value::<SynologyResponse<Value>>(value)
        .map_err(|e| InvalidResponse(format!("Unexpected response envelope: {e}")))?;

    if envelope.success {
        return Ok(envelope.data.map_or(ApiResponse::Success, ApiResponse::Data));
    }

    let code = envelope.error.map_or(100, |error| error.code);
    Err(Api {
        code,
        message: describe_error(code),
    })
}
