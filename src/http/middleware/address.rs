//! Replacement address announcement.
//!
//! A bind point configured with a `new_address` tells every client, on every
//! response, where to connect next. Clients switch on their next connect, so
//! the old and new addresses must both stay valid while the header is sent.

use axum::http::header::{HeaderName, HeaderValue, InvalidHeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

/// Header carrying the replacement address, `https://<new_address>`.
pub const REPLACEMENT_ADDRESS_HEADER: &str = "ziti-ctrl-address";

/// Header value announcing `new_address`.
pub fn replacement_address_value(new_address: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::try_from(format!("https://{}", new_address.trim()))
}

/// Layer setting [`REPLACEMENT_ADDRESS_HEADER`] to `value` on every response.
pub fn replacement_address_layer(value: HeaderValue) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(HeaderName::from_static(REPLACEMENT_ADDRESS_HEADER), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn sets_header_on_every_response() {
        let app = Router::new()
            .route("/ok", axum::routing::get(|| async { "ok" }))
            .layer(replacement_address_layer(
                replacement_address_value("new.example.com:443").unwrap(),
            ));

        for (uri, status) in [("/ok", StatusCode::OK), ("/missing", StatusCode::NOT_FOUND)] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), status);
            assert_eq!(
                response.headers().get(REPLACEMENT_ADDRESS_HEADER).unwrap(),
                "https://new.example.com:443"
            );
        }
    }

    #[test]
    fn rejects_unencodable_address() {
        assert!(replacement_address_value("bad\naddress:1").is_err());
        assert_eq!(replacement_address_value(" moved:1 ").unwrap(), "https://moved:1");
    }
}
