//! Exact-match route table.

use std::collections::HashMap;

use crate::http::{Request, Response};

/// Handler invoked for a matched route.
pub type Handler = Box<dyn Fn(&Request) -> Response + Send + Sync>;

/// Route table with exact `"METHOD path"` keys.
///
/// The method is upper-cased on both registration and lookup, so method
/// matching is case-insensitive while path matching stays case-sensitive.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a specific method and path.
    pub fn register<F>(&mut self, method: &str, path: &str, handler: F)
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.routes
            .insert(Self::route_key(method, path), Box::new(handler));
    }

    /// Dispatch a request. Never fails: unmatched requests get the 404
    /// response below.
    pub fn route(&self, request: &Request) -> Response {
        match self
            .routes
            .get(&Self::route_key(request.method(), request.path()))
        {
            Some(handler) => handler(request),
            None => Self::not_found(request.path()),
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn route_key(method: &str, path: &str) -> String {
        format!("{} {}", method.to_ascii_uppercase(), path)
    }

    fn not_found(path: &str) -> Response {
        Response::builder()
            .status(404, "Not Found")
            .header("Content-Type", "text/plain")
            .body(format!("404 Not Found: {}", path))
            .build()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str) -> Request {
        Request::new(method, path, Default::default(), "")
    }

    #[test]
    fn routes_to_registered_handler() {
        let mut router = Router::new();
        router.register("GET", "/hello", |_| Response::ok("hi"));

        let resp = router.route(&request("GET", "/hello"));
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.body(), "hi");
    }

    #[test]
    fn unmatched_route_yields_404_with_path() {
        let router = Router::new();
        let resp = router.route(&request("GET", "/missing"));
        assert_eq!(resp.status_code(), 404);
        assert_eq!(resp.reason_phrase(), "Not Found");
        assert!(resp.body().contains("/missing"));
    }

    #[test]
    fn method_matching_is_case_insensitive() {
        let mut router = Router::new();
        router.register("GET", "/x", |_| Response::ok("x"));

        // The parser upper-cases methods, but the router must not depend on it.
        let resp = router.route(&request("get", "/x"));
        assert_eq!(resp.status_code(), 200);
    }

    #[test]
    fn path_matching_is_exact() {
        let mut router = Router::new();
        router.register("GET", "/x", |_| Response::ok("x"));

        assert_eq!(router.route(&request("GET", "/x/")).status_code(), 404);
        assert_eq!(router.route(&request("GET", "/X")).status_code(), 404);
    }

    #[test]
    fn method_mismatch_yields_404() {
        let mut router = Router::new();
        router.register("GET", "/x", |_| Response::ok("x"));

        assert_eq!(router.route(&request("POST", "/x")).status_code(), 404);
    }

    #[test]
    fn handler_sees_request_body() {
        let mut router = Router::new();
        router.register("POST", "/echo", |req| Response::ok(req.body().to_string()));

        let req = Request::new("POST", "/echo", Default::default(), "payload");
        assert_eq!(router.route(&req).body(), "payload");
    }
}
