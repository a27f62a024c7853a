use super::*;
use crate::http::client::Client;
use crate::http::http2::{Config, Http2Conn, StreamHandle};
use crate::http::url::Url;
use std::net::TcpListener;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn methods_parse_and_display() {
    for method in [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::CONNECT,
        Method::OPTIONS,
        Method::TRACE,
    ] {
        assert_eq!(Method::from_str(&method.to_string()).unwrap(), method);
    }
    assert!(Method::from_str("get").is_err());
    assert!(Method::from_str("BREW").is_err());
}

#[test]
fn url_parts() {
    let url = Url::try_from("https://example.com:8443/a/b?x=1").unwrap();
    assert!(url.secure);
    assert_eq!(url.host, "example.com");
    assert_eq!(url.port, Some(8443));
    assert_eq!(url.path(), "/a/b?x=1");
    assert_eq!(url.authority(), "example.com:8443");
    assert_eq!(url.host_header(), "example.com:8443");
    assert_eq!(url.to_string(), "https://example.com:8443/a/b?x=1");

    let url = Url::try_from("http://example.com").unwrap();
    assert_eq!(url.scheme(), "http");
    assert_eq!(url.path(), "/");
    assert_eq!(url.authority(), "example.com:80");
    assert_eq!(url.host_header(), "example.com");

    // no scheme means https
    let url = Url::try_from("example.com/x").unwrap();
    assert_eq!(url.authority(), "example.com:443");

    assert!(Url::try_from("http:///path").is_err());
    assert!(Url::try_from("http://host:port/").is_err());
}

#[test]
fn url_from_request_pseudo_headers() {
    let url = Url::from_parts("http", "localhost:8080", "/items?page=2");
    assert!(!url.secure);
    assert_eq!(url.port, Some(8080));
    assert_eq!(url.resource, "/items");
    assert_eq!(url.query, "page=2");
}

#[test]
fn request_builders() {
    let request = Request::post("http://host/submit")
        .unwrap()
        .query(&[("a", "1"), ("b", "2")])
        .headers(&[("Content-Type", "application/json"), ("x-id", "7")])
        .body(b"{}");
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.url.path(), "/submit?a=1&b=2");
    assert_eq!(request.get_header("content-type"), Some("application/json"));
    assert_eq!(request.get_header("X-ID"), Some("7"));
    assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    assert!(Request::get("").is_err());
}

#[test]
fn response_helpers() {
    let response = Response::new(404)
        .header("Content-Type", "text/plain")
        .body(b"missing");
    assert_eq!(response.get_header("content-type"), Some("text/plain"));
    assert_eq!(response.get_header("etag"), None);
    let shown = response.to_string();
    assert!(shown.contains("404 Not Found"));
    assert!(shown.contains("missing"));
}

fn serve_once(listener: TcpListener, accepted: Arc<AtomicUsize>) -> thread::JoinHandle<Http2Conn> {
    thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        accepted.fetch_add(1, Ordering::SeqCst);
        let handler = |request: Request, _stream: &StreamHandle| {
            Response::new(200).body(request.url.path().as_bytes())
        };
        Http2Conn::server(socket, Config::default(), handler).unwrap()
    })
}

#[test]
fn client_reuses_its_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let server = serve_once(listener, accepted.clone());

    let config = Config::builder()
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let mut client = Client::with_config(config);
    for path in ["/one", "/two", "/three"] {
        let request = Request::get(&format!("http://127.0.0.1:{port}{path}")).unwrap();
        let response = client.execute(request).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, path.as_bytes());
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    drop(server.join().unwrap());
}

#[test]
fn client_reports_unreachable_hosts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let mut client = Client::new();
    let err = client
        .execute(Request::get(&format!("http://127.0.0.1:{port}/")).unwrap())
        .unwrap_err();
    assert!(err.is_io());
}
