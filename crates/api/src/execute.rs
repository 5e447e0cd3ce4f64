//! Picks the execution mode for a raw request.

use std::{collections::BTreeMap, path::Path};

use {
    serde_json::Value,
    tracing::debug,
    xurl_common::{MediaError, Result},
};

use crate::{
    client::{ApiClient, FileSource, MultipartOptions, RequestOptions},
    media::MEDIA_ENDPOINT,
};

/// Paths that answer with a long-lived line-delimited stream.
pub const STREAMING_ENDPOINTS: &[&str] = &[
    "/2/tweets/search/stream",
    "/2/tweets/sample/stream",
    "/2/tweets/sample10/stream",
    "/2/tweets/firehose/stream",
    "/2/tweets/firehose/stream/lang/en",
    "/2/tweets/firehose/stream/lang/ja",
    "/2/tweets/firehose/stream/lang/ko",
    "/2/tweets/firehose/stream/lang/pt",
    "/2/likes/firehose/stream",
    "/2/likes/sample10/stream",
    "/2/users/firehose/stream",
];

/// Run one request in the mode it calls for.
///
/// A media append with a local file goes out as multipart, known streaming
/// endpoints (or `force_stream`) are streamed line by line into `sink`, and
/// everything else is a buffered call. Returns the JSON body for buffered
/// calls and `None` for streams.
pub async fn handle_request(
    client: &mut ApiClient,
    opts: &RequestOptions,
    force_stream: bool,
    media_file: Option<&Path>,
    sink: impl FnMut(&str),
) -> Result<Option<Value>> {
    if let Some(file) = media_file
        && is_media_append_request(&opts.endpoint, Some(file))
    {
        return send_media_append(client, opts, file).await.map(Some);
    }

    if force_stream || is_streaming_endpoint(&opts.endpoint) {
        debug!(endpoint = %opts.endpoint, "streaming request");
        client.stream_request(opts, sink).await?;
        return Ok(None);
    }

    client.send_request(opts).await.map(Some)
}

async fn send_media_append(
    client: &mut ApiClient,
    opts: &RequestOptions,
    file: &Path,
) -> Result<Value> {
    if extract_media_id(&opts.endpoint).is_none() {
        return Err(MediaError::MissingMediaId.into());
    }
    let segment_index = extract_segment_index(&opts.data).unwrap_or_else(|| "0".into());
    debug!(endpoint = %opts.endpoint, segment_index = %segment_index, "sending media append");

    client
        .send_multipart_request(MultipartOptions {
            request: opts.clone(),
            form_fields: BTreeMap::from([("segment_index".to_string(), segment_index)]),
            file_field: "media".into(),
            file: FileSource::Path(file.to_path_buf()),
        })
        .await
}

/// Whether a request targets the media append endpoint with a local file.
pub fn is_media_append_request(url: &str, media_file: Option<&Path>) -> bool {
    url.contains(MEDIA_ENDPOINT)
        && url.contains("append")
        && media_file.is_some_and(|f| !f.as_os_str().is_empty())
}

/// Media id named by an append/finalize path or a `media_id` query
/// parameter. The initialize endpoint has none.
pub fn extract_media_id(url: &str) -> Option<String> {
    if !url.contains(MEDIA_ENDPOINT) || url.ends_with("/2/media/upload/initialize") {
        return None;
    }

    let prefix = format!("{MEDIA_ENDPOINT}/");
    if let Some((_, rest)) = url.split_once(prefix.as_str()) {
        for suffix in ["/append", "/finalize"] {
            if let Some(idx) = rest.find(suffix) {
                return Some(rest[..idx].to_string()).filter(|id| !id.is_empty());
            }
        }
    }

    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("media_id="))
        .map(str::to_string)
        .filter(|id| !id.is_empty())
}

/// `segment_index` from a JSON body such as `{"segment_index":"2"}`.
pub fn extract_segment_index(data: &str) -> Option<String> {
    let map: BTreeMap<String, String> = serde_json::from_str(data).ok()?;
    map.get("segment_index").cloned()
}

/// Whether the path (query ignored) is a known streaming endpoint.
pub fn is_streaming_endpoint(url: &str) -> bool {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let after_scheme = &without_query[scheme_end + 3..];
            after_scheme
                .find('/')
                .map_or("", |slash| &after_scheme[slash..])
        },
        None => without_query,
    };
    let path = path.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    STREAMING_ENDPOINTS.contains(&path.as_str())
}
