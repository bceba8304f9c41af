//! Header field iteration for the engine.
//!
//! Headers are handed to the engine as an ordered sequence of
//! `(name, value)` pairs. The `host` field is also forwarded under the
//! `:authority` alias so rules written against either name see it,
//! whatever the protocol version canonicalized it to.

use std::iter;

use axum::http::{request, response, Uri};

/// A header as seen by the engine.
pub type HeaderField<'a> = (&'a str, &'a [u8]);

/// Traditional name of the authority field.
pub const HOST: &str = "host";

/// Alternate name the authority field is also forwarded under.
pub const HOST_ALIAS: &str = ":authority";

/// Repeat every `host` field under [`HOST_ALIAS`].
pub fn with_host_alias<'a, I>(headers: I) -> impl Iterator<Item = HeaderField<'a>>
where
    I: IntoIterator<Item = HeaderField<'a>>,
{
    headers.into_iter().flat_map(|(name, value)| {
        let alias = name.eq_ignore_ascii_case(HOST).then_some((HOST_ALIAS, value));
        iter::once((name, value)).chain(alias)
    })
}

/// Request header fields in wire order.
///
/// HTTP/2 carries the authority in the URI rather than a `host` header; it
/// is surfaced as `host` so both protocol versions look the same.
pub fn request_fields(head: &request::Parts) -> impl Iterator<Item = HeaderField<'_>> + '_ {
    let authority = head
        .uri
        .authority()
        .filter(|_| !head.headers.contains_key(HOST))
        .map(|authority| (HOST, authority.as_str().as_bytes()));

    head.headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_bytes()))
        .chain(authority)
}

/// Response header fields in wire order.
pub fn response_fields(head: &response::Parts) -> impl Iterator<Item = HeaderField<'_>> + '_ {
    head.headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_bytes()))
}

/// Path and query as sent on the request line.
pub fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}
