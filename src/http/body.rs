//! Body handling for the inspection session.
//!
//! # Responsibilities
//! - Hold frames while the filter asks for stop-and-buffer
//! - Replay held frames, then stream the remainder through the filter
//! - Abort a streamed body when the filter intervenes mid-stream
//!
//! # Data Flow
//! ```text
//! hold():    frame → filter (StopIterationAndBuffer) → held
//!            frame → filter (Continue)                → replay(held ++ rest)
//!            frame → filter (intervened)              → Err(Blocked)
//!
//! inspect(): hyper polls InspectedBody → filter sees each frame as it passes
//! ```

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::{Body, Bytes};
use axum::BoxError;
use futures_util::stream::{self, StreamExt};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use thiserror::Error;

use crate::filter::{DataStatus, Direction, TrailersStatus};
use crate::http::session::Session;

#[derive(Debug, Error)]
pub enum HoldError {
    #[error("transaction blocked by inspection filter")]
    Blocked,
    #[error("body stream failed: {0}")]
    Stream(#[source] BoxError),
}

/// Error ending a streamed body the filter blocked.
#[derive(Debug, Error)]
#[error("stream blocked by inspection filter")]
pub struct StreamBlocked;

/// Feeds every frame of `inner` to the session as it is polled.
pub struct InspectedBody<B> {
    inner: B,
    session: Session,
    direction: Direction,
    finished: bool,
}

impl<B> InspectedBody<B> {
    pub fn new(inner: B, session: Session, direction: Direction) -> Self {
        Self {
            inner,
            session,
            direction,
            finished: false,
        }
    }
}

impl<B> HttpBody for InspectedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                let end_stream = this.inner.is_end_stream();
                {
                    let mut filter = this.session.lock();
                    match frame.data_ref() {
                        Some(data) => {
                            filter.on_data(this.direction, data, end_stream);
                        }
                        None => {
                            filter.on_trailers(this.direction);
                        }
                    }
                }
                if this.session.intervened() {
                    this.finished = true;
                    return Poll::Ready(Some(Err(Box::new(StreamBlocked))));
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
            None => {
                this.finished = true;
                // Ended without an end-of-stream data frame.
                this.session.lock().on_data(this.direction, &[], true);
                if this.session.intervened() {
                    return Poll::Ready(Some(Err(Box::new(StreamBlocked))));
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Streams `body` through the session without holding anything.
pub fn inspect(session: &Session, direction: Direction, body: Body) -> Body {
    Body::new(InspectedBody::new(body, session.clone(), direction))
}

/// Holds frames until the filter lets the stream continue.
pub async fn hold(session: &Session, direction: Direction, mut body: Body) -> Result<Body, HoldError> {
    let mut held: Vec<Frame<Bytes>> = Vec::new();

    loop {
        let Some(frame) = body.frame().await else {
            session.lock().on_data(direction, &[], true);
            session.check_blocked()?;
            return Ok(replay(held, None, session, direction));
        };
        let frame = frame.map_err(|e| HoldError::Stream(e.into()))?;
        let end_stream = body.is_end_stream();

        let status = match frame.data_ref() {
            Some(data) => session.lock().on_data(direction, data, end_stream),
            None => match session.lock().on_trailers(direction) {
                TrailersStatus::Continue => DataStatus::Continue,
                TrailersStatus::StopIteration => DataStatus::StopIterationNoBuffer,
            },
        };
        session.check_blocked()?;
        held.push(frame);

        match status {
            DataStatus::StopIterationAndBuffer => continue,
            DataStatus::Continue => return Ok(replay(held, Some(body), session, direction)),
            DataStatus::StopIterationNoBuffer => return Err(HoldError::Blocked),
        }
    }
}

fn replay(held: Vec<Frame<Bytes>>, rest: Option<Body>, session: &Session, direction: Direction) -> Body {
    tracing::debug!(frames = held.len(), direction = direction.as_str(), "Releasing held body");
    let held = stream::iter(held.into_iter().map(Ok::<_, BoxError>));
    match rest {
        Some(rest) => {
            let rest = BodyStream::new(InspectedBody::new(rest, session.clone(), direction));
            Body::new(StreamBody::new(held.chain(rest)))
        }
        None => Body::new(StreamBody::new(held)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InspectionFlags;
    use crate::filter::test_support::{Call, ScriptedEngine};
    use crate::filter::{ConnectionInfo, InspectionFilter, Transaction};
    use crate::http::session::PipelineCallbacks;
    use axum::http::{Request, Version};

    fn session(engine: &ScriptedEngine) -> Session {
        let callbacks = PipelineCallbacks::new(
            ConnectionInfo {
                downstream: "203.0.113.9:50000".parse().unwrap(),
                local: "203.0.113.1:8080".parse().unwrap(),
            },
            Version::HTTP_11,
            InspectionFlags::default(),
        );
        Session::new(InspectionFilter::with_transaction(
            Transaction::new("body-test", engine.transaction()),
            callbacks,
        ))
    }

    fn chunked(chunks: &[&'static str]) -> Body {
        let frames = chunks
            .iter()
            .map(|c| Ok::<_, BoxError>(Frame::data(Bytes::from_static(c.as_bytes()))))
            .collect::<Vec<_>>();
        Body::new(StreamBody::new(stream::iter(frames)))
    }

    fn head() -> axum::http::request::Parts {
        Request::builder().method("POST").uri("/upload").body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_held_body_replayed_in_full() {
        let engine = ScriptedEngine::enabled();
        let session = session(&engine);

        let body = session.decode(&head(), chunked(&["alpha-", "beta-", "gamma"])).await.unwrap();
        let bytes = body.collect().await.unwrap().to_bytes();

        assert_eq!(&bytes[..], b"alpha-beta-gamma");
        let bodies = engine.calls().iter().filter(|c| **c == Call::RequestBody).count();
        assert_eq!(bodies, 1);
    }

    #[tokio::test]
    async fn test_block_on_body_stops_hold() {
        let engine = ScriptedEngine::enabled().block_on(Call::RequestBody, 403);
        let session = session(&engine);

        let result = session.decode(&head(), chunked(&["x=1", "&y=2"])).await;

        assert!(matches!(result, Err(HoldError::Blocked)));
        assert_eq!(session.take_reply().unwrap().status, 403);
    }

    #[tokio::test]
    async fn test_streamed_body_reaches_engine() {
        let engine = ScriptedEngine::with_mode(crate::engine::RuleEngineMode::DetectionOnly);
        let session = session(&engine);

        let body = session.decode(&head(), chunked(&["one", "two"])).await.unwrap();
        let bytes = body.collect().await.unwrap().to_bytes();

        assert_eq!(&bytes[..], b"onetwo");
        let calls = engine.calls();
        assert!(calls.contains(&Call::RequestChunk(b"one".to_vec())));
        assert!(calls.contains(&Call::RequestChunk(b"two".to_vec())));
        assert!(calls.contains(&Call::RequestBody));
    }

    #[tokio::test]
    async fn test_limit_releases_held_body() {
        let engine = ScriptedEngine::enabled().body_limit(4);
        let session = session(&engine);

        let body = session.decode(&head(), chunked(&["abc", "def", "ghi"])).await.unwrap();
        let bytes = body.collect().await.unwrap().to_bytes();

        assert_eq!(&bytes[..], b"abcdefghi");
        let chunks = engine.calls().iter().filter(|c| matches!(c, Call::RequestChunk(_))).count();
        assert_eq!(chunks, 2);
    }
}
