use std::convert::Infallible;

use axum::{
    http::{header::HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;

use hiredrill_core::events::StreamEvent;

const ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");
const ENCODE_FAILED: &str = r#"{"type":"error","message":"Failed to encode event"}"#;

/// Serves pipeline events as `data:` frames with proxy buffering disabled.
pub fn event_response<T, S>(events: S) -> Response
where
    T: Serialize,
    S: Stream<Item = StreamEvent<T>> + Send + 'static,
{
    let frames = events.map(|event| Ok::<_, Infallible>(encode(&event)));
    let mut response = Sse::new(frames).keep_alive(KeepAlive::default()).into_response();
    response.headers_mut().insert(ACCEL_BUFFERING, HeaderValue::from_static("no"));
    response
}

/// A stream made of one terminal error event.
pub fn single_error(message: impl Into<String>) -> Response {
    event_response(stream::iter([StreamEvent::<()>::error(message)]))
}

fn encode<T: Serialize>(event: &StreamEvent<T>) -> Event {
    Event::default().json_data(event).unwrap_or_else(|error| {
        tracing::error!(event_name = "api.sse.encode_failed", error = %error, "could not encode event");
        Event::default().data(ENCODE_FAILED)
    })
}
