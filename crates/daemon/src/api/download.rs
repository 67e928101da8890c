use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::codec::{BytesCodec, FramedRead};
use uuid::Uuid;

use super::{ApiError, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download/:video_id", get(download))
        .with_state(state)
}

/// Streams a finished video. Honors single byte ranges so players can seek.
async fn download(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let path = state.settings.output_dir.join(format!("{video_id}.mp4"));
    let missing = || ApiError::not_found(format!("no video {video_id}"));

    let file_size = tokio::fs::metadata(&path)
        .await
        .map_err(|_| missing())?
        .len();

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, file_size));
    let (start, end, status) = match range {
        Some((start, end)) => (start, end, StatusCode::PARTIAL_CONTENT),
        None => (0, file_size.saturating_sub(1), StatusCode::OK),
    };
    let content_length = if file_size == 0 { 0 } else { end - start + 1 };

    let mut file = tokio::fs::File::open(&path).await.map_err(|_| missing())?;
    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|e| ApiError::from(crate::error::PipelineError::Io(e)))?;
    let stream = FramedRead::new(file.take(content_length), BytesCodec::new())
        .map(|chunk| chunk.map(|bytes| bytes.freeze()));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_length.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{video_id}.mp4\""),
        );
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{file_size}"),
        );
    }

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::from(crate::error::PipelineError::Render(e.to_string())))
}

/// Parses `bytes=a-b`, `bytes=a-` and `bytes=-n` against a file size.
fn parse_range(value: &str, file_size: u64) -> Option<(u64, u64)> {
    if file_size == 0 {
        return None;
    }
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());
    let last = file_size - 1;

    let (start, end) = match (start.is_empty(), end.is_empty()) {
        (true, true) => return None,
        (true, false) => {
            let suffix: u64 = end.parse().ok()?;
            if suffix == 0 {
                return None;
            }
            (file_size.saturating_sub(suffix), last)
        }
        (false, true) => (start.parse().ok()?, last),
        (false, false) => (start.parse().ok()?, end.parse::<u64>().ok()?.min(last)),
    };
    (start <= end && start < file_size).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_range_forms() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range("bytes=900-", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=500-5000", 1000), Some((500, 999)));
    }

    #[test]
    fn rejects_unsatisfiable_ranges() {
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=50-10", 1000), None);
        assert_eq!(parse_range("items=0-1", 1000), None);
        assert_eq!(parse_range("bytes=-", 1000), None);
        assert_eq!(parse_range("bytes=0-1", 0), None);
    }
}
