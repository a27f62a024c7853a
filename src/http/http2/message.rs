//! Translation between header lists with pseudo-headers and the generic
//! request/response model.

use crate::http::http2::frames::ErrorCode;
use crate::http::request::headers::*;
use crate::http::url::Url;
use crate::http::{Error, Method, Request, Response, Result};
use std::str::FromStr;

pub mod headers {
    pub const METHOD: &str = ":method";
    pub const SCHEME: &str = ":scheme";
    pub const AUTHORITY: &str = ":authority";
    pub const PATH: &str = ":path";
    pub const STATUS: &str = ":status";
}

pub type HeaderList = Vec<(String, String)>;

/// Connection-specific fields that HTTP/2 forbids.
fn is_connection_specific(name: &str, value: &str) -> bool {
    match name {
        CONNECTION | KEEP_ALIVE | PROXY_CONNECTION | TRANSFER_ENCODING | UPGRADE => true,
        TE => !value.eq_ignore_ascii_case(values::TRAILERS),
        _ => false,
    }
}

fn regular_fields<'a>(
    fields: impl Iterator<Item = &'a (String, String)> + 'a,
) -> impl Iterator<Item = (String, String)> + 'a {
    fields
        .map(|(n, v)| (n.to_ascii_lowercase(), v.clone()))
        .filter(|(n, v)| !n.starts_with(':') && n != HOST && !is_connection_specific(n, v))
}

/// Pseudo-headers first, then the regular fields lowercased. A `host`
/// header stands in for `:authority` when the url carries no host.
pub fn request_headers(request: &Request) -> HeaderList {
    let mut fields = Vec::with_capacity(request.headers.len() + 4);
    let authority = match request.url.host.is_empty() {
        true => request.get_header(HOST).unwrap_or_default().to_string(),
        false => request.url.host_header(),
    };
    fields.push((headers::METHOD.to_string(), request.method.to_string()));
    if request.method != Method::CONNECT {
        fields.push((headers::SCHEME.to_string(), request.url.scheme().to_string()));
        fields.push((headers::PATH.to_string(), request.url.path()));
    }
    fields.push((headers::AUTHORITY.to_string(), authority));
    fields.extend(regular_fields(request.headers.iter()));

    fields
}

/// Splits a response into its leading header list and the trailer fields
/// named by its `trailer` header.
pub fn response_headers(response: &Response) -> (HeaderList, HeaderList) {
    let declared: Vec<String> = response
        .get_header(TRAILER)
        .map(|t| {
            t.split(',')
                .map(|n| n.trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let mut leading = vec![(headers::STATUS.to_string(), response.status_code.to_string())];
    let mut trailers = Vec::new();
    for (name, value) in regular_fields(response.headers.iter()) {
        match declared.contains(&name) {
            true => trailers.push((name, value)),
            false => leading.push((name, value)),
        }
    }

    (leading, trailers)
}

fn take_pseudo<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn strip_pseudo(fields: HeaderList) -> HeaderList {
    fields
        .into_iter()
        .filter(|(n, _)| !n.starts_with(':'))
        .collect()
}

/// Assembles a received request. A missing `:method`, or a missing `:path`
/// on anything but CONNECT, is malformed.
pub fn into_request(fields: HeaderList, body: Vec<u8>) -> Result<Request> {
    let malformed = |what: &str| Error::stream(ErrorCode::ProtocolError, what);
    let method = take_pseudo(&fields, headers::METHOD)
        .ok_or_else(|| malformed("request without :method"))?;
    let method = Method::from_str(method).map_err(|e| malformed(e.message()))?;
    let path = match (take_pseudo(&fields, headers::PATH), method) {
        (Some(path), _) if !path.is_empty() => path,
        (_, Method::CONNECT) => "",
        _ => return Err(malformed("request without :path")),
    };
    let scheme = take_pseudo(&fields, headers::SCHEME).unwrap_or("https");
    let authority = take_pseudo(&fields, headers::AUTHORITY)
        .or_else(|| take_pseudo(&fields, HOST))
        .unwrap_or_default();
    let url = Url::from_parts(scheme, authority, path);

    Ok(Request {
        method,
        url,
        headers: strip_pseudo(fields),
        body: match body.is_empty() {
            true => None,
            false => Some(body),
        },
    })
}

/// Assembles a received response; `:status` must be present and numeric.
pub fn into_response(fields: HeaderList, body: Vec<u8>) -> Result<Response> {
    let status_code = take_pseudo(&fields, headers::STATUS)
        .and_then(|s| u16::from_str(s).ok())
        .ok_or_else(|| {
            Error::protocol(ErrorCode::ProtocolError, "response without a valid :status")
        })?;

    Ok(Response {
        status_code,
        headers: strip_pseudo(fields),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HeaderList {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn request_pseudo_headers_come_first() {
        let request = Request::get("http://host/search?q=1")
            .unwrap()
            .header("Accept", "*/*")
            .header("Connection", "keep-alive");
        assert_eq!(
            request_headers(&request),
            fields(&[
                (":method", "GET"),
                (":scheme", "http"),
                (":path", "/search?q=1"),
                (":authority", "host"),
                ("accept", "*/*"),
            ])
        );
    }

    #[test]
    fn connect_has_no_path_or_scheme() {
        let request = Request::connect("proxy.example:8443").unwrap();
        assert_eq!(
            request_headers(&request),
            fields(&[(":method", "CONNECT"), (":authority", "proxy.example:8443")])
        );
    }

    #[test]
    fn trailers_are_split_out() {
        let response = Response::new(200)
            .header("content-type", "text/plain")
            .header("trailer", "x-checksum")
            .header("x-checksum", "abc");
        let (leading, trailers) = response_headers(&response);
        assert_eq!(
            leading,
            fields(&[
                (":status", "200"),
                ("content-type", "text/plain"),
                ("trailer", "x-checksum"),
            ])
        );
        assert_eq!(trailers, fields(&[("x-checksum", "abc")]));
    }

    #[test]
    fn request_assembly() {
        let request = into_request(
            fields(&[
                (":method", "POST"),
                (":scheme", "https"),
                (":authority", "example.com:8443"),
                (":path", "/upload?x=1"),
                ("content-type", "text/plain"),
            ]),
            b"body".to_vec(),
        )
        .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.host, "example.com");
        assert_eq!(request.url.port, Some(8443));
        assert_eq!(request.url.path(), "/upload?x=1");
        assert_eq!(request.headers, fields(&[("content-type", "text/plain")]));
        assert_eq!(request.body, Some(b"body".to_vec()));
    }

    #[test]
    fn malformed_requests() {
        let err = into_request(fields(&[(":path", "/")]), Vec::new()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
        let err = into_request(fields(&[(":method", "GET")]), Vec::new()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
        assert!(into_request(
            fields(&[(":method", "CONNECT"), (":authority", "a:1")]),
            Vec::new()
        )
        .is_ok());
    }

    #[test]
    fn response_assembly() {
        let response = into_response(
            fields(&[(":status", "404"), ("server", "test")]),
            b"missing".to_vec(),
        )
        .unwrap();
        assert_eq!(response.status_code, 404);
        assert_eq!(response.headers, fields(&[("server", "test")]));
        assert!(into_response(fields(&[("server", "test")]), Vec::new()).is_err());
        assert!(into_response(fields(&[(":status", "ok")]), Vec::new()).is_err());
    }
}
