use std::path::PathBuf;

use {
    anyhow::Result,
    clap::{ArgAction, Subcommand},
    xurl_api::{
        ApiClient, MediaUploader,
        media::{DEFAULT_MEDIA_CATEGORY, DEFAULT_MEDIA_TYPE},
        upload_file,
    },
    xurl_config::XurlConfig,
    xurl_oauth::Authenticator,
};

use crate::{RequestFlags, print_json, report};

#[derive(Subcommand)]
pub enum MediaAction {
    /// Upload a file through the chunked media endpoint.
    Upload {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_MEDIA_TYPE)]
        media_type: String,
        #[arg(long, default_value = DEFAULT_MEDIA_CATEGORY)]
        category: String,
        /// Wait for video processing to finish (`--wait=false` to skip).
        #[arg(
            long,
            default_value_t = true,
            num_args = 0..=1,
            default_missing_value = "true",
            action = ArgAction::Set
        )]
        wait: bool,
        #[command(flatten)]
        flags: RequestFlags,
    },
    /// Show the processing status of uploaded media.
    Status {
        media_id: String,
        /// Poll until processing finishes.
        #[arg(short, long)]
        wait: bool,
        #[command(flatten)]
        flags: RequestFlags,
    },
}

pub async fn handle_media(action: MediaAction, config: &XurlConfig, auth: Authenticator) -> Result<()> {
    let mut client = ApiClient::new(config, Some(auth))?;

    match action {
        MediaAction::Upload {
            file,
            media_type,
            category,
            wait,
            flags,
        } => {
            let outcome = upload_file(
                &mut client,
                flags.template()?,
                &file,
                &media_type,
                &category,
                wait,
            )
            .await
            .map_err(report)?;

            print_json(&outcome.finalize)?;
            if let Some(status) = &outcome.processing {
                print_json(status)?;
            }
            println!("Media uploaded successfully! Media ID: {}", outcome.media_id);
        },
        MediaAction::Status {
            media_id,
            wait,
            flags,
        } => {
            let mut uploader = MediaUploader::for_media_id(&mut client, flags.template()?, media_id);
            let status = if wait {
                uploader.wait_for_processing().await
            } else {
                uploader.check_status().await
            }
            .map_err(report)?;
            print_json(&status)?;
        },
    }
    Ok(())
}
