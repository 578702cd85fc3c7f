use rocket::fairing::AdHoc;
use rocket::http::{Header, Status};

use crate::common::PROCESSED_ROUTE;

/// Processed images never change once written, so clients may cache them forever.
pub fn cache_control_fairing() -> AdHoc {
    AdHoc::on_response("Cache-Control", |req, res| {
        Box::pin(async move {
            if req.uri().path().as_str().starts_with(PROCESSED_ROUTE) && res.status() == Status::Ok
            {
                res.set_header(Header::new(
                    "Cache-Control",
                    "public, max-age=31536000, immutable",
                ));
            }
        })
    })
}
