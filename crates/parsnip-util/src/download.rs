//! Streaming HTTP download used by the tarball fetch fallback.

use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::error::UtilError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(600);

/// Progress is printed at most once per this many bytes, so small archives
/// stay quiet and large ones do not flood stderr.
const REPORT_EVERY: u64 = 512 * 1024;

/// Download a URL into `dest`, streaming the body to disk.
///
/// Returns the number of bytes written. Coarse progress is printed to
/// stderr, labelled with `label`.
///
/// # Errors
/// Returns an error if the HTTP request fails, the file cannot be written,
/// or a read error occurs during streaming.
pub fn download_to_file(url: &str, dest: &Path, label: &str) -> Result<u64, UtilError> {
    let config = ureq::config::Config::builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_global(Some(TOTAL_TIMEOUT))
        .build();
    let response = ureq::Agent::new_with_config(config)
        .get(url)
        .call()
        .map_err(|e| UtilError::Download {
            message: format!("{url}: {e}"),
        })?;

    let total: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let file = std::fs::File::create(dest).map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })?;
    let mut out = std::io::BufWriter::new(file);
    let mut reader = response.into_body().into_reader();

    let mut written: u64 = 0;
    let mut next_report: u64 = REPORT_EVERY;
    let mut buf = [0u8; 32 * 1024];

    loop {
        let n = reader.read(&mut buf).map_err(|e| UtilError::Download {
            message: format!("{url}: {e}"),
        })?;
        if n == 0 {
            break;
        }
        let Some(chunk) = buf.get(..n) else {
            break;
        };
        out.write_all(chunk).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;

        written = written.saturating_add(n as u64);
        if written >= next_report {
            eprint!("\r    Downloading {label}... {}", render_amount(written, total));
            next_report = written.saturating_add(REPORT_EVERY);
        }
    }

    out.flush().map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })?;
    eprintln!("\r    Downloaded {label} ({})   ", render_amount(written, None));

    Ok(written)
}

/// `"312 KB"`, or `"312 KB / 2 MB"` when the total is known.
fn render_amount(written: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => format!("{} / {}", human_size(written), human_size(total)),
        _ => human_size(written),
    }
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MB", bytes / (1024 * 1024))
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}
