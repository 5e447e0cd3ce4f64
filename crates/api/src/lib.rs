//! X API request dispatch: buffered, streaming and multipart calls, the
//! chunked media upload, and routing of raw requests between them.

pub mod client;
pub mod execute;
pub mod media;

pub use {
    client::{ApiClient, FileSource, MultipartOptions, RequestOptions},
    execute::handle_request,
    media::{MediaState, MediaUploadSession, MediaUploader, UploadOutcome, upload_file},
};
