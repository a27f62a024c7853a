pub const CONTINUE: u16 = 100;
pub const SWITCHING_PROTOCOLS: u16 = 101;

pub const OK: u16 = 200;
pub const CREATED: u16 = 201;
pub const ACCEPTED: u16 = 202;
pub const NO_CONTENT: u16 = 204;

pub const MOVED_PERMANENTLY: u16 = 301;
pub const FOUND: u16 = 302;
pub const NOT_MODIFIED: u16 = 304;

pub const BAD_REQUEST: u16 = 400;
pub const UNAUTHORIZED: u16 = 401;
pub const FORBIDDEN: u16 = 403;
pub const NOT_FOUND: u16 = 404;
pub const METHOD_NOT_ALLOWED: u16 = 405;
pub const REQUEST_TIMEOUT: u16 = 408;
pub const MISDIRECTED: u16 = 421;
pub const UNPROCESSABLE_ENTITY: u16 = 422;
pub const TOO_MANY_REQUESTS: u16 = 429;

pub const INTERNAL_SERVER_ERROR: u16 = 500;
pub const NOT_IMPLEMENTED: u16 = 501;
pub const SERVICE_UNAVAILABLE: u16 = 503;
pub const HTTP_VERSION_NOT_SUPPORTED: u16 = 505;

pub fn reason(status: u16) -> &'static str {
    match status {
        CONTINUE => "Continue",
        SWITCHING_PROTOCOLS => "Switching Protocols",
        OK => "OK",
        CREATED => "Created",
        ACCEPTED => "Accepted",
        NO_CONTENT => "No Content",
        MOVED_PERMANENTLY => "Moved Permanently",
        FOUND => "Found",
        NOT_MODIFIED => "Not Modified",
        BAD_REQUEST => "Bad Request",
        UNAUTHORIZED => "Unauthorized",
        FORBIDDEN => "Forbidden",
        NOT_FOUND => "Not Found",
        METHOD_NOT_ALLOWED => "Method Not Allowed",
        REQUEST_TIMEOUT => "Request Timeout",
        MISDIRECTED => "Misdirected Request",
        UNPROCESSABLE_ENTITY => "Unprocessable Entity",
        TOO_MANY_REQUESTS => "Too Many Requests",
        INTERNAL_SERVER_ERROR => "Internal Server Error",
        NOT_IMPLEMENTED => "Not Implemented",
        SERVICE_UNAVAILABLE => "Service Unavailable",
        HTTP_VERSION_NOT_SUPPORTED => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
