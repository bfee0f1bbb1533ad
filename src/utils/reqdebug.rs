#![forbid(unsafe_code)]

use log::debug;
use poem::Request;

/// Implemented by every request body so handlers can log a readable dump
/// of the inbound payload at debug level without hand-rolling a `Display`
/// for each one.
pub trait RequestDebug {
    type Req;
    fn get_request_info(&self) -> String;
}

// ---------------------------------------------------------------------------
// debug_request:
// ---------------------------------------------------------------------------
/** Conditionally log the method, path and body of an inbound request.
 * Cheap no-op when the debug log level isn't enabled.
 */
pub fn debug_request<T: RequestDebug>(http_req: &Request, req: &T) {
    if log::log_enabled!(log::Level::Debug) {
        debug!(
            "{} {}\n{}",
            http_req.method(),
            http_req.uri(),
            req.get_request_info()
        );
    }
}
