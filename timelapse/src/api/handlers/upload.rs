use crate::api::models::{ErrorResponse, UploadForm, UploadResponse};
use crate::errors::{Error, Result};
use crate::metrics::{Outcome, record_job};
use crate::storage::{StagedJob, sanitize_filename};
use crate::transcoder::{InvalidSpeed, Speed, TranscodeRequest};
use crate::AppState;
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;

const SUCCESS_MESSAGE: &str = "Video processed successfully";

/// What the `video` field turned out to be.
enum VideoPart {
    /// Present but with an empty file name
    Unselected,
    /// File name sanitized to nothing
    Unsafe,
    /// Not written to disk because the speed was already known to be invalid
    Skipped(InvalidSpeed),
    Staged(StagedJob),
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "timelapse",
    summary = "Create a timelapse",
    description = "Upload a video and get back a link to a sped-up, silent MP4. \
                   The video is processed synchronously; the request completes when the transcoder does.",
    request_body(
        content = UploadForm,
        content_type = "multipart/form-data",
        description = "The video file and an optional speed factor (default 4)"
    ),
    responses(
        (status = 200, description = "Video processed successfully", body = UploadResponse),
        (status = 400, description = "Missing video, empty file name, invalid speed or invalid filename", body = ErrorResponse),
        (status = 413, description = "Video exceeds the upload size limit", body = ErrorResponse),
        (status = 500, description = "FFmpeg missing, timed out or failed", body = ErrorResponse),
    )
)]
#[instrument(skip_all, fields(request_id = tracing::field::Empty))]
pub async fn upload_video(State(state): State<AppState>, multipart: Multipart) -> Result<Json<UploadResponse>> {
    let started = Instant::now();
    let result = process_upload(&state, multipart).await;

    let outcome = Outcome::of(&result);
    record_job(outcome, started.elapsed());
    info!(outcome = outcome.as_str(), elapsed = ?started.elapsed(), "Upload finished");

    result.map(Json)
}

async fn process_upload(state: &AppState, mut multipart: Multipart) -> Result<UploadResponse> {
    let executable = state.transcoder.locate().ok_or_else(|| Error::TranscoderUnavailable {
        help: state.transcoder.install_help(),
    })?;

    let request_id = Uuid::new_v4();
    Span::current().record("request_id", tracing::field::display(request_id));

    let mut video: Option<VideoPart> = None;
    let mut speed: Option<std::result::Result<Speed, InvalidSpeed>> = None;

    // Fields are read in arrival order; checks are applied afterwards so the reported error does
    // not depend on the order the client sent them in. A video arriving after an invalid speed is
    // never written.
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "video" if video.is_none() => {
                // A part without a file name is a plain form field, not a file
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };

                video = Some(if file_name.is_empty() {
                    VideoPart::Unselected
                } else {
                    match (sanitize_filename(&file_name), &speed) {
                        (None, _) => VideoPart::Unsafe,
                        (Some(_), Some(Err(invalid))) => VideoPart::Skipped(*invalid),
                        (Some(sanitized), _) => {
                            debug!(file_name = %file_name, sanitized = %sanitized, "Receiving video");
                            VideoPart::Staged(stage_video(state, request_id, &sanitized, field).await?)
                        }
                    }
                });
            }
            "speed" if speed.is_none() => {
                speed = Some(field.text().await.map_err(multipart_error)?.parse::<Speed>());
            }
            _ => {
                debug!(field = %field_name, "Ignoring multipart field");
            }
        }
    }

    let job = match video.ok_or_else(|| bad_request("No video file found"))? {
        VideoPart::Unselected => return Err(bad_request("No video file selected")),
        VideoPart::Skipped(invalid) => return Err(invalid.into()),
        VideoPart::Unsafe => None,
        VideoPart::Staged(job) => Some(job),
    };

    let speed = match speed {
        Some(parsed) => parsed?,
        None => state.transcoder.default_speed(),
    };

    let job = job.ok_or_else(|| bad_request("Invalid filename"))?;

    state.workspace.remove_stale_output(&job).await?;

    let request = TranscodeRequest {
        input: job.input.clone(),
        output: job.output.clone(),
        speed,
    };
    info!(command = %request.command_line(&executable), "Running FFmpeg");

    let output = state.transcoder.run(&executable, &request).await?;
    debug!(stdout = %output.stdout, stderr = %output.stderr, elapsed = ?output.elapsed, "FFmpeg succeeded");

    let output_name = job.output_name.clone();
    let published = state.workspace.publish(job).await?;
    info!(path = %published.display(), "Published timelapse");

    Ok(UploadResponse {
        download_url: state.config.download_url(&output_name),
        message: SUCCESS_MESSAGE.to_string(),
    })
}

/// Stream the video field into a fresh work file, enforcing the upload size limit.
async fn stage_video(state: &AppState, request_id: Uuid, sanitized: &str, mut field: Field<'_>) -> Result<StagedJob> {
    let job = state.workspace.stage(request_id, sanitized);
    let mut file = state.workspace.create_input(&job).await?;

    let max_upload_size = state.config.storage.max_upload_size;
    let mut total_size = 0u64;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        total_size += chunk.len() as u64;
        if total_size > max_upload_size {
            return Err(Error::PayloadTooLarge {
                message: format!("Video exceeds the maximum upload size of {max_upload_size} bytes"),
            });
        }

        file.write_all(&chunk).await.map_err(|source| Error::Io {
            operation: "write upload",
            path: job.input.clone(),
            source,
        })?;
    }

    file.flush().await.map_err(|source| Error::Io {
        operation: "write upload",
        path: job.input.clone(),
        source,
    })?;

    debug!(bytes = total_size, path = %job.input.display(), "Stored upload");
    Ok(job)
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { message: e.body_text() }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {e}"),
        }
    }
}

fn bad_request(message: &str) -> Error {
    Error::BadRequest {
        message: message.to_string(),
    }
}
