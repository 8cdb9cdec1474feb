use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::Request;
use rocket::{Data, Response};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;

/// Per-request correlation id, echoed back as `X-Request-Id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    pub fn of<'a>(request: &'a Request<'_>) -> &'a str {
        request
            .local_cache(|| None::<RequestId>)
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("unknown")
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

struct RequestStart(Option<Instant>);

/// Tags each request with an id and logs its outcome with latency and caller.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::new();
        request.local_cache(|| Some(request_id.clone()));
        request.local_cache(|| RequestStart(Some(Instant::now())));

        info!(request_id = %request_id.0, method = %request.method(), uri = %request.uri(), "incoming request");
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = RequestId::of(request).to_string();
        let elapsed_ms = request
            .local_cache(|| RequestStart(None))
            .0
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or_default();
        let user_id = request
            .local_cache(|| None::<CurrentUser>)
            .as_ref()
            .map(|user| user.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        let status = response.status();
        response.set_header(Header::new("X-Request-Id", request_id.clone()));
        response.set_header(Header::new("Cache-Control", "no-store"));

        if status.class().is_success() || status.class().is_informational() || status.class().is_redirection() {
            info!(
                request_id = %request_id,
                user_id = %user_id,
                method = %request.method(),
                uri = %request.uri(),
                status = status.code,
                elapsed_ms,
                "request completed"
            );
        } else {
            warn!(
                request_id = %request_id,
                user_id = %user_id,
                method = %request.method(),
                uri = %request.uri(),
                status = status.code,
                elapsed_ms,
                "request failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_utils::MemoryRepository;
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;
    use std::sync::Arc;

    #[test]
    fn request_ids_are_unique_uuids() {
        let first = RequestId::new();
        let second = RequestId::default();
        assert!(Uuid::parse_str(&first.0).is_ok());
        assert_ne!(first.0, second.0);
    }

    #[rocket::async_test]
    async fn responses_carry_request_id_and_no_store() {
        let rocket = crate::build_rocket_with_repository(Config::default(), Arc::new(MemoryRepository::new())).expect("valid configuration");
        let client = Client::tracked(rocket).await.expect("valid rocket instance");

        for uri in ["/api/health", "/api/expenses"] {
            let response = client.get(uri).dispatch().await;
            assert!([Status::Ok, Status::Unauthorized].contains(&response.status()));
            let request_id = response.headers().get_one("X-Request-Id").unwrap();
            assert!(Uuid::parse_str(request_id).is_ok());
            assert_eq!(response.headers().get_one("Cache-Control"), Some("no-store"));
        }
    }
}
