//! Response handling.
//!
//! # Responsibilities
//! - Build the local reply for a blocked transaction
//! - Pass that reply once through the encode path of its own filter
//!
//! # Design Decisions
//! - The reply is plain text with the status chosen by the engine
//! - Encoding the reply meets an intervened transaction, so the engine
//!   never sees it

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;

use crate::engine::Intervention;
use crate::filter::LocalReply;
use crate::http::session::Session;

/// Response carrying the session's pending local reply.
pub fn local_reply(session: &Session) -> Response<Body> {
    let reply = session.take_reply().unwrap_or_else(|| {
        tracing::warn!(txn = %session.id(), "No pending local reply, sending default block");
        LocalReply::blocked(Intervention::block(StatusCode::FORBIDDEN.as_u16()))
    });

    let mut response = (reply.status, reply.body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

    let (head, body) = response.into_parts();
    {
        let mut filter = session.lock();
        let headers = filter.encode_headers(&head, false);
        let data = filter.encode_data(reply.body.as_bytes(), true);
        tracing::debug!(
            txn = %filter.transaction().id(),
            status = %reply.status,
            ?headers,
            ?data,
            "Local reply sent"
        );
    }
    Response::from_parts(head, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InspectionFlags;
    use crate::filter::test_support::{Call, ScriptedEngine};
    use crate::filter::{ConnectionInfo, InspectionFilter, Transaction, BLOCKED_BODY};
    use crate::http::session::PipelineCallbacks;
    use axum::http::{Request, Version};
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_reply_passes_encode_path_untouched() {
        let engine = ScriptedEngine::enabled().block_on(Call::RequestHeaders, 406);
        let callbacks = PipelineCallbacks::new(
            ConnectionInfo {
                downstream: "203.0.113.9:50000".parse().unwrap(),
                local: "203.0.113.1:8080".parse().unwrap(),
            },
            Version::HTTP_11,
            InspectionFlags::default(),
        );
        let session = Session::new(InspectionFilter::with_transaction(
            Transaction::new("reply-test", engine.transaction()),
            callbacks,
        ));

        let head = Request::builder().uri("/").body(()).unwrap().into_parts().0;
        assert!(session.decode(&head, Body::empty()).await.is_err());

        let response = local_reply(&session);
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], BLOCKED_BODY.as_bytes());

        assert!(!session.has_reply());
        assert!(!engine.calls().iter().any(|c| matches!(c, Call::ResponseHeaders(_) | Call::ResponseChunk(_))));
    }
}
