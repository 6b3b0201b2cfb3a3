use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub(crate) fn text_response<B>(status: StatusCode, body: B) -> Result<Response<Bytes>, http::Error>
where
    B: Into<Bytes>,
{
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
        .body(body.into())
}

pub(crate) fn redirect_response(location: &str) -> Result<Response<Bytes>, http::Error> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
        .body(Bytes::from(format!("Found. Redirecting to {}", location)))
}
