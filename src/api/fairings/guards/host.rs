use rocket::Request;
use rocket::request::{FromRequest, Outcome};

/// The `Host` header of the request, if any. Used to build absolute result URLs.
pub struct GuardHost(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GuardHost {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let host = req
            .headers()
            .get_one("Host")
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string);
        Outcome::Success(GuardHost(host))
    }
}
