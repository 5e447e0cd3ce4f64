//! Chunked media upload: initialize, append, finalize, then optionally poll
//! until server-side processing reaches a terminal state.

use std::{collections::BTreeMap, path::Path, time::Duration};

use {
    serde::Deserialize,
    serde_json::Value,
    tokio::io::{AsyncRead, AsyncReadExt},
    tracing::{debug, info},
    xurl_common::{MediaError, Result},
};

use crate::client::{ApiClient, FileSource, MultipartOptions, RequestOptions};

pub const MEDIA_ENDPOINT: &str = "/2/media/upload";
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const DEFAULT_MEDIA_TYPE: &str = "video/mp4";
pub const DEFAULT_MEDIA_CATEGORY: &str = "amplify_video";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Created,
    Initialized,
    Appending,
    Finalized,
    Processing,
    Succeeded,
    Failed,
}

/// Progress of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUploadSession {
    media_id: Option<String>,
    source_size: u64,
    bytes_sent: u64,
    segment_index: u32,
    state: MediaState,
}

impl MediaUploadSession {
    pub fn new(source_size: u64) -> Self {
        Self {
            media_id: None,
            source_size,
            bytes_sent: 0,
            segment_index: 0,
            state: MediaState::Created,
        }
    }

    /// A session for media uploaded earlier, usable for status checks.
    pub fn resume(media_id: impl Into<String>) -> Self {
        Self {
            media_id: Some(media_id.into()),
            state: MediaState::Finalized,
            ..Self::new(0)
        }
    }

    pub fn media_id(&self) -> Option<&str> {
        self.media_id.as_deref()
    }

    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Index the next appended segment will carry.
    pub fn segment_index(&self) -> u32 {
        self.segment_index
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    fn require_id(&self) -> Result<String, MediaError> {
        self.media_id.clone().ok_or(MediaError::MissingMediaId)
    }
}

/// `data.processing_info` of a finalize or status response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessingInfo {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub check_after_secs: i64,
    #[serde(default)]
    pub progress_percent: i64,
}

impl ProcessingInfo {
    pub fn from_response(response: &Value) -> Result<Option<Self>> {
        match response.pointer("/data/processing_info") {
            Some(info) => Ok(Some(serde_json::from_value(info.clone())?)),
            None => Ok(None),
        }
    }

    /// Seconds to wait before the next poll; never less than one.
    pub fn wait_secs(&self) -> u64 {
        self.check_after_secs.max(1).unsigned_abs()
    }
}

pub struct MediaUploader<'a> {
    client: &'a mut ApiClient,
    /// Auth, user, headers and flags shared by every request of the upload.
    template: RequestOptions,
    session: MediaUploadSession,
    poll_unit: Duration,
}

impl<'a> MediaUploader<'a> {
    pub fn new(client: &'a mut ApiClient, template: RequestOptions, source_size: u64) -> Self {
        Self {
            client,
            template,
            session: MediaUploadSession::new(source_size),
            poll_unit: Duration::from_secs(1),
        }
    }

    /// An uploader for existing media, for status checks only.
    pub fn for_media_id(
        client: &'a mut ApiClient,
        template: RequestOptions,
        media_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            template,
            session: MediaUploadSession::resume(media_id),
            poll_unit: Duration::from_secs(1),
        }
    }

    /// Length of one `check_after_secs` second while polling.
    pub fn with_poll_unit(mut self, unit: Duration) -> Self {
        self.poll_unit = unit;
        self
    }

    pub fn session(&self) -> &MediaUploadSession {
        &self.session
    }

    fn request(&self, method: &str, endpoint: String, data: String) -> RequestOptions {
        RequestOptions {
            method: method.to_string(),
            endpoint,
            data,
            ..self.template.clone()
        }
    }

    /// Declare the upload and record the media id the server assigns.
    pub async fn initialize(&mut self, media_type: &str, media_category: &str) -> Result<Value> {
        if self.template.verbose {
            eprintln!("Initializing media upload...");
        }
        let body = serde_json::json!({
            "total_bytes": self.session.source_size,
            "media_type": media_type,
            "media_category": media_category,
        });
        let opts = self.request(
            "POST",
            format!("{MEDIA_ENDPOINT}/initialize"),
            body.to_string(),
        );
        let response = self.client.send_request(&opts).await?;

        let media_id = response
            .pointer("/data/id")
            .and_then(Value::as_str)
            .ok_or(MediaError::MissingMediaId)?;
        info!(media_id, size = self.session.source_size, "media upload initialized");
        self.session.media_id = Some(media_id.to_string());
        self.session.state = MediaState::Initialized;
        Ok(response)
    }

    /// Send one segment. Segment indices start at 0 and grow by one.
    pub async fn append_chunk(&mut self, file_name: &str, chunk: Vec<u8>) -> Result<Value> {
        let media_id = self.session.require_id()?;
        let len = chunk.len() as u64;
        let index = self.session.segment_index;

        let opts = MultipartOptions {
            request: self.request("POST", format!("{MEDIA_ENDPOINT}/{media_id}/append"), String::new()),
            form_fields: BTreeMap::from([("segment_index".to_string(), index.to_string())]),
            file_field: "media".into(),
            file: FileSource::Bytes {
                file_name: file_name.to_string(),
                data: chunk,
            },
        };
        let response = self.client.send_multipart_request(opts).await?;

        self.session.state = MediaState::Appending;
        self.session.bytes_sent += len;
        self.session.segment_index += 1;
        debug!(
            segment = index,
            sent = self.session.bytes_sent,
            total = self.session.source_size,
            "media segment uploaded"
        );
        if self.template.verbose && self.session.source_size > 0 {
            eprintln!(
                "Uploaded {} of {} bytes ({:.2}%)",
                self.session.bytes_sent,
                self.session.source_size,
                self.session.bytes_sent as f64 / self.session.source_size as f64 * 100.0
            );
        }
        Ok(response)
    }

    /// Read `reader` to the end in [`CHUNK_SIZE`] segments, appending each.
    /// The first failure aborts the upload.
    pub async fn append_from<R>(&mut self, mut reader: R, file_name: &str) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        self.session.require_id()?;
        loop {
            let mut chunk = Vec::with_capacity(CHUNK_SIZE);
            let read = (&mut reader)
                .take(CHUNK_SIZE as u64)
                .read_to_end(&mut chunk)
                .await?;
            if read == 0 {
                break;
            }
            self.append_chunk(file_name, chunk).await?;
        }
        Ok(())
    }

    pub async fn finalize(&mut self) -> Result<Value> {
        let media_id = self.session.require_id()?;
        if self.template.verbose {
            eprintln!("Finalizing media upload...");
        }
        let opts = self.request("POST", format!("{MEDIA_ENDPOINT}/{media_id}/finalize"), String::new());
        let response = self.client.send_request(&opts).await?;

        self.session.state = match ProcessingInfo::from_response(&response)? {
            Some(_) => MediaState::Processing,
            None => MediaState::Finalized,
        };
        info!(media_id = %media_id, "media upload finalized");
        Ok(response)
    }

    pub async fn check_status(&mut self) -> Result<Value> {
        let media_id = self.session.require_id()?;
        let opts = self.request(
            "GET",
            format!("{MEDIA_ENDPOINT}?command=STATUS&media_id={media_id}"),
            String::new(),
        );
        self.client.send_request(&opts).await
    }

    /// Poll the status endpoint until processing succeeds or fails.
    ///
    /// There is no attempt limit; the server decides when processing ends.
    /// A response without `processing_info` means nothing is pending.
    pub async fn wait_for_processing(&mut self) -> Result<Value> {
        self.session.require_id()?;
        loop {
            let response = self.check_status().await?;
            let Some(info) = ProcessingInfo::from_response(&response)? else {
                self.session.state = MediaState::Succeeded;
                return Ok(response);
            };
            match info.state.as_str() {
                "succeeded" => {
                    self.session.state = MediaState::Succeeded;
                    info!("media processing complete");
                    return Ok(response);
                },
                "failed" => {
                    self.session.state = MediaState::Failed;
                    return Err(MediaError::ProcessingFailed(response).into());
                },
                state => {
                    self.session.state = MediaState::Processing;
                    let wait = info.wait_secs();
                    debug!(state, progress = info.progress_percent, wait, "media still processing");
                    if self.template.verbose {
                        eprintln!(
                            "Media processing in progress ({}%), checking again in {wait} seconds...",
                            info.progress_percent
                        );
                    }
                    tokio::time::sleep(self.poll_unit * wait as u32).await;
                },
            }
        }
    }
}

/// Result of [`upload_file`].
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub media_id: String,
    pub finalize: Value,
    /// Final status response when processing was awaited.
    pub processing: Option<Value>,
}

/// Upload a local file end to end.
///
/// Processing is awaited only when `wait` is set and the category is a
/// video category.
pub async fn upload_file(
    client: &mut ApiClient,
    template: RequestOptions,
    path: &Path,
    media_type: &str,
    media_category: &str,
    wait: bool,
) -> Result<UploadOutcome> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(MediaError::NotAFile(path.display().to_string()).into());
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut uploader = MediaUploader::new(client, template, metadata.len());
    uploader.initialize(media_type, media_category).await?;
    let file = tokio::fs::File::open(path).await?;
    uploader.append_from(file, &file_name).await?;
    let finalize = uploader.finalize().await?;

    let processing = if wait && media_category.contains("video") {
        Some(uploader.wait_for_processing().await?)
    } else {
        None
    };

    let media_id = uploader.session().media_id().unwrap_or_default().to_string();
    Ok(UploadOutcome {
        media_id,
        finalize,
        processing,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{body_string_contains, method, path, query_param},
        },
        xurl_common::Error,
        xurl_config::XurlConfig,
        xurl_oauth::Authenticator,
        xurl_store::CredentialStore,
    };

    fn client(base: &str, dir: &tempfile::TempDir) -> ApiClient {
        let mut store = CredentialStore::load(dir.path().join(".xurl")).unwrap();
        store.save_bearer_token(None, "B").unwrap();
        let config = XurlConfig {
            api_base_url: base.to_string(),
            ..XurlConfig::default()
        };
        let auth = Authenticator::new(&config, store);
        ApiClient::new(&config, Some(auth)).unwrap()
    }

    async fn mount_upload_endpoints(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/2/media/upload/initialize"))
            .and(body_string_contains("\"total_bytes\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"id": "m1", "media_key": "7_m1"}})),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/m1/append"))
            .respond_with(ResponseTemplate::new(204))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/m1/finalize"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"id": "m1"}})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    fn status(state: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "id": "m1",
                "processing_info": {"state": state, "check_after_secs": 0, "progress_percent": 40}
            }
        }))
    }

    fn segment_index_of(body: &[u8]) -> Option<u32> {
        let text = String::from_utf8_lossy(body);
        let marker = "name=\"segment_index\"\r\n\r\n";
        let start = text.find(marker)? + marker.len();
        text[start..].split("\r\n").next()?.parse().ok()
    }

    #[tokio::test]
    async fn ten_megabytes_upload_in_three_segments() {
        let server = MockServer::start().await;
        mount_upload_endpoints(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.uri(), &dir);

        let size = 10_000_000u64;
        let data = vec![b'#'; size as usize];
        let mut uploader = MediaUploader::new(&mut c, RequestOptions::default(), size);
        uploader.initialize("video/mp4", "amplify_video").await.unwrap();
        uploader
            .append_from(std::io::Cursor::new(data), "clip.mp4")
            .await
            .unwrap();
        uploader.finalize().await.unwrap();

        let session = uploader.session();
        assert_eq!(session.bytes_sent(), size);
        assert_eq!(session.segment_index(), 3);
        assert_eq!(session.state(), MediaState::Finalized);

        let appends: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path().ends_with("/append"))
            .collect();
        let indices: Vec<_> = appends.iter().map(|r| segment_index_of(&r.body)).collect();
        assert_eq!(indices, [Some(0), Some(1), Some(2)]);

        for (request, expected) in appends.iter().zip([4_194_304, 4_194_304, 1_611_392]) {
            let payload = request.body.iter().filter(|&&b| b == b'#').count();
            assert_eq!(payload, expected);
        }
    }

    #[tokio::test]
    async fn session_without_media_id_rejects_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = client("http://127.0.0.1:9", &dir);
        let mut uploader = MediaUploader::new(&mut c, RequestOptions::default(), 10);

        let err = uploader.append_chunk("a.bin", vec![0; 10]).await.unwrap_err();
        assert!(matches!(err, Error::Media(MediaError::MissingMediaId)));
        let err = uploader.finalize().await.unwrap_err();
        assert!(matches!(err, Error::Media(MediaError::MissingMediaId)));
        let err = uploader.check_status().await.unwrap_err();
        assert!(matches!(err, Error::Media(MediaError::MissingMediaId)));
        assert_eq!(uploader.session().state(), MediaState::Created);
    }

    #[tokio::test]
    async fn polls_until_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/media/upload"))
            .and(query_param("command", "STATUS"))
            .and(query_param("media_id", "m1"))
            .respond_with(status("in_progress"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/media/upload"))
            .respond_with(status("succeeded"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.uri(), &dir);
        let mut uploader = MediaUploader::for_media_id(&mut c, RequestOptions::default(), "m1")
            .with_poll_unit(Duration::from_millis(5));

        let response = uploader.wait_for_processing().await.unwrap();
        assert_eq!(response["data"]["processing_info"]["state"], "succeeded");
        assert_eq!(uploader.session().state(), MediaState::Succeeded);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_processing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/media/upload"))
            .respond_with(status("failed"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.uri(), &dir);
        let mut uploader = MediaUploader::for_media_id(&mut c, RequestOptions::default(), "m1");

        let err = uploader.wait_for_processing().await.unwrap_err();
        assert!(matches!(err, Error::Media(MediaError::ProcessingFailed(_))));
        assert_eq!(uploader.session().state(), MediaState::Failed);
    }

    #[test]
    fn poll_interval_is_at_least_one_second() {
        let info = |secs| ProcessingInfo {
            check_after_secs: secs,
            ..ProcessingInfo::default()
        };
        assert_eq!(info(0).wait_secs(), 1);
        assert_eq!(info(-5).wait_secs(), 1);
        assert_eq!(info(7).wait_secs(), 7);
    }

    #[tokio::test]
    async fn upload_file_skips_wait_for_images() {
        let server = MockServer::start().await;
        mount_upload_endpoints(&server).await;
        Mock::given(method("GET"))
            .and(path("/2/media/upload"))
            .respond_with(status("succeeded"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.png");
        std::fs::write(&file, b"png-bytes").unwrap();
        let mut c = client(&server.uri(), &dir);

        let outcome = upload_file(
            &mut c,
            RequestOptions::default(),
            &file,
            "image/png",
            "tweet_image",
            true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.media_id, "m1");
        assert!(outcome.processing.is_none());
    }

    #[tokio::test]
    async fn upload_file_waits_for_video() {
        let server = MockServer::start().await;
        mount_upload_endpoints(&server).await;
        Mock::given(method("GET"))
            .and(path("/2/media/upload"))
            .respond_with(status("succeeded"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"mp4-bytes").unwrap();
        let mut c = client(&server.uri(), &dir);

        let outcome = upload_file(
            &mut c,
            RequestOptions::default(),
            &file,
            DEFAULT_MEDIA_TYPE,
            DEFAULT_MEDIA_CATEGORY,
            true,
        )
        .await
        .unwrap();
        assert!(outcome.processing.is_some());
    }

    #[tokio::test]
    async fn upload_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = client("http://127.0.0.1:9", &dir);
        let err = upload_file(
            &mut c,
            RequestOptions::default(),
            dir.path(),
            "image/png",
            "tweet_image",
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Media(MediaError::NotAFile(_))));
    }
}
