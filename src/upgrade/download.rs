//! Streaming asset downloads.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::upgrade::UpgradeError;
use crate::utils::ProgressBar;

/// Download `url` into `dest`, streaming the body chunk by chunk.
///
/// Any 2xx status is accepted. A progress bar labelled `label` is shown when
/// `show_progress` is set and progress output is not globally disabled.
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`UpgradeError::Download`] for transport failures, non-2xx
/// responses and local write failures. A partially written `dest` is left
/// for the caller's scratch directory to clean up.
pub async fn download_asset(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    label: &str,
    show_progress: bool,
) -> Result<u64, UpgradeError> {
    let fail = |reason: String| UpgradeError::Download {
        url: url.to_string(),
        reason,
    };

    debug!("Downloading {} to {}", url, dest.display());
    let response = client.get(url).send().await.map_err(|e| fail(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("HTTP {status}")));
    }

    let progress = show_progress.then(|| ProgressBar::download(response.content_length(), label));

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| fail(format!("cannot create {}: {e}", dest.display())))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| fail(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| fail(format!("cannot write {}: {e}", dest.display())))?;
        written += chunk.len() as u64;
        if let Some(progress) = &progress {
            progress.inc(chunk.len() as u64);
        }
    }
    file.flush().await.map_err(|e| fail(format!("cannot write {}: {e}", dest.display())))?;

    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    debug!("Downloaded {} bytes from {}", written, url);
    Ok(written)
}
