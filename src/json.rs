use rocket::data::{Data, FromData, Outcome, ToByteUnit};
use rocket::http::Status;
use rocket::request::Request;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Why a request body was refused, kept in the request cache for the catcher.
#[derive(Debug, Clone)]
pub struct BodyRejection(pub String);

impl BodyRejection {
    pub fn of<'a>(request: &'a Request<'_>) -> Option<&'a BodyRejection> {
        request.local_cache(|| None::<BodyRejection>).as_ref()
    }
}

/// JSON request body. Bodies that cannot be read or deserialized are refused
/// with 400 (413 when over the `json` limit) and the reason is cached for the
/// error response.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

fn reject<'r, T>(req: &'r Request<'_>, status: Status, reason: String) -> Outcome<'r, JsonBody<T>, BodyRejection> {
    req.local_cache(|| Some(BodyRejection(reason.clone())));
    Outcome::Error((status, BodyRejection(reason)))
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned> FromData<'r> for JsonBody<T> {
    type Error = BodyRejection;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or_else(|| 1.mebibytes());

        let bytes = match data.open(limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                warn!(method = %req.method(), uri = %req.uri(), %limit, "request body over the JSON limit");
                return reject(req, Status::PayloadTooLarge, format!("request body exceeds {}", limit));
            }
            Err(e) => {
                warn!(method = %req.method(), uri = %req.uri(), error = %e, "could not read request body");
                return reject(req, Status::BadRequest, "request body could not be read".to_string());
            }
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Outcome::Success(JsonBody(value)),
            Err(e) => {
                warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    error = %e,
                    category = ?e.classify(),
                    "rejected JSON request body"
                );
                reject(req, Status::BadRequest, e.to_string())
            }
        }
    }
}
