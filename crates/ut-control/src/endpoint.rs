//! REST-style endpoint requests and response rendering.
//!
//! A handler returns YAML or JSON text. The text is parsed into a document and
//! emitted again in the format named by the client's `Accept` header, so
//! handlers never deal with content negotiation.

use tracing::{error, warn};
use ut_kvp::{Document, DocumentFormat, KeyStringMapping, map_string, map_value};

use crate::registry::{EndpointHandler, HttpMethod};
use crate::transport::{Response, Status};

const ENDPOINT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::endpoint");

const FORMAT_UNKNOWN: i32 = -1;
const FORMAT_YAML: i32 = 0;
const FORMAT_JSON: i32 = 1;

/// Media types understood during negotiation. The first row for each format
/// is the `Content-Type` sent back.
const MEDIA_TYPES: &[KeyStringMapping] = &[
    KeyStringMapping::new("application/x-yaml", FORMAT_YAML),
    KeyStringMapping::new("application/json", FORMAT_JSON),
    KeyStringMapping::new("application/yaml", FORMAT_YAML),
    KeyStringMapping::new("text/yaml", FORMAT_YAML),
    KeyStringMapping::new("text/x-yaml", FORMAT_YAML),
    KeyStringMapping::new("text/json", FORMAT_JSON),
];

/// Request handed to an [`EndpointHandler`].
#[derive(Debug)]
pub struct EndpointRequest {
    method: HttpMethod,
    path: String,
    query: Option<String>,
    accept: Option<String>,
    body: Option<Document>,
}

impl EndpointRequest {
    pub(crate) fn new(
        method: HttpMethod,
        target: &str,
        accept: Option<&str>,
        body: Option<Document>,
    ) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        Self {
            method,
            path: path.to_owned(),
            query,
            accept: accept.map(str::to_owned),
            body,
        }
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Request path, without the query string.
    #[must_use]
    pub const fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Raw `Accept` header, if any.
    #[must_use]
    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    /// Parsed request body, if one was sent.
    #[must_use]
    pub const fn body(&self) -> Option<&Document> {
        self.body.as_ref()
    }

    /// Format the response will be emitted in.
    #[must_use]
    pub fn response_format(&self) -> DocumentFormat {
        negotiate(self.accept())
    }
}

/// Picks the first media range in `accept` that names a known format.
/// Anything unrecognised falls back to YAML.
pub(crate) fn negotiate(accept: Option<&str>) -> DocumentFormat {
    let code = accept
        .into_iter()
        .flat_map(|header| header.split(','))
        .map(|range| {
            let media = range.split(';').next().unwrap_or_default().trim();
            map_value(MEDIA_TYPES, &media.to_ascii_lowercase(), FORMAT_UNKNOWN)
        })
        .find(|code| *code != FORMAT_UNKNOWN)
        .unwrap_or(FORMAT_YAML);
    if code == FORMAT_JSON {
        DocumentFormat::Json
    } else {
        DocumentFormat::Yaml
    }
}

fn content_type(format: DocumentFormat) -> &'static str {
    let code = match format {
        DocumentFormat::Json => FORMAT_JSON,
        DocumentFormat::Yaml => FORMAT_YAML,
    };
    map_string(MEDIA_TYPES, code).unwrap_or("text/plain")
}

/// Builds the response for a matched endpoint.
pub(crate) fn respond(
    handler: &dyn EndpointHandler,
    method: HttpMethod,
    target: &str,
    accept: Option<&str>,
    body: &[u8],
) -> Response {
    let document = if body.is_empty() {
        None
    } else {
        match Document::from_bytes(body) {
            Ok(document) => Some(document),
            Err(failure) => {
                warn!(target: ENDPOINT_TARGET, %method, path = target, error = %failure, "request body rejected");
                return Response::plain(Status::BadRequest, "request body is not valid YAML or JSON\n");
            }
        }
    };
    let request = EndpointRequest::new(method, target, accept, document);
    let format = request.response_format();

    let Some(text) = handler.on_request(&request) else {
        error!(target: ENDPOINT_TARGET, %method, path = target, "endpoint handler produced no response");
        return Response::plain(Status::InternalServerError, "endpoint produced no response\n");
    };
    match render(&text, format) {
        Ok(rendered) => Response::new(Status::Ok, content_type(format), rendered.into_bytes()),
        Err(failure) => {
            error!(
                target: ENDPOINT_TARGET,
                %method,
                path = target,
                error = %failure,
                "endpoint response is not valid YAML or JSON"
            );
            Response::plain(Status::InternalServerError, "endpoint response is malformed\n")
        }
    }
}

fn render(text: &str, format: DocumentFormat) -> Result<String, ut_kvp::KvpError> {
    Document::from_bytes(text.as_bytes())?.data_as(format)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, DocumentFormat::Yaml)]
    #[case(Some("application/json"), DocumentFormat::Json)]
    #[case(Some("Application/JSON; charset=utf-8"), DocumentFormat::Json)]
    #[case(Some("text/html, application/json;q=0.9"), DocumentFormat::Json)]
    #[case(Some("application/x-yaml, application/json"), DocumentFormat::Yaml)]
    #[case(Some("*/*"), DocumentFormat::Yaml)]
    fn accept_header_negotiation(#[case] accept: Option<&str>, #[case] expected: DocumentFormat) {
        assert_eq!(negotiate(accept), expected);
    }

    #[test]
    fn content_types_use_the_canonical_name() {
        assert_eq!(content_type(DocumentFormat::Json), "application/json");
        assert_eq!(content_type(DocumentFormat::Yaml), "application/x-yaml");
    }

    #[test]
    fn handler_text_is_re_emitted_as_json() {
        let handler = |_request: &EndpointRequest| Some("status: up\ncount: 3\n".to_owned());

        let response = respond(&handler, HttpMethod::Get, "/status", Some("application/json"), b"");

        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = serde_json::from_slice(response.body()).expect("json body");
        assert_eq!(body, serde_json::json!({ "status": "up", "count": 3 }));
    }

    #[rstest]
    #[case(None, b"".as_slice(), Status::InternalServerError)]
    #[case(Some("key: [broken"), b"".as_slice(), Status::InternalServerError)]
    #[case(Some("ok: true"), b"{unclosed".as_slice(), Status::BadRequest)]
    fn failures_map_to_status_codes(
        #[case] reply: Option<&'static str>,
        #[case] body: &[u8],
        #[case] expected: Status,
    ) {
        let handler = move |_request: &EndpointRequest| reply.map(str::to_owned);
        let response = respond(&handler, HttpMethod::Post, "/config", None, body);
        assert_eq!(response.status(), expected);
    }

    #[test]
    fn handlers_see_the_parsed_body_and_query() {
        let handler = |request: &EndpointRequest| {
            let document = request.body()?;
            let value = document.get_u32("settings/volume");
            Some(format!("volume: {value}\nquery: {}\n", request.query().unwrap_or_default()))
        };

        let response = respond(
            &handler,
            HttpMethod::Post,
            "/audio?verbose=1",
            None,
            b"settings:\n  volume: 11\n",
        );

        let text = String::from_utf8(response.body().to_vec()).expect("utf8");
        assert!(text.contains("volume: 11"), "unexpected body: {text}");
        assert!(text.contains("verbose=1"), "unexpected body: {text}");
    }
}
