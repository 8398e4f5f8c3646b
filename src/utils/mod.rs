use std::path::Path;
use std::time::{Duration, SystemTime};

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format a duration in whole seconds as `M:SS`
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Whole seconds, rounded up, never below one
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// Cut text to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Create the temp directory if it does not exist yet
pub fn ensure_temp_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs_err::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "Created temp directory");
    }
    Ok(())
}

/// Delete one file. Failures are logged, never returned.
pub fn cleanup_file(path: &Path) {
    if !path.exists() {
        return;
    }

    match fs_err::remove_file(path) {
        Ok(()) => tracing::debug!(file = %path.display(), "Deleted temp file"),
        Err(e) => tracing::warn!(file = %path.display(), error = %e, "Failed to delete temp file"),
    }
}

/// Delete a directory and everything under it. Failures are logged, never returned.
pub fn cleanup_dir(path: &Path) {
    if !path.exists() {
        return;
    }

    match fs_err::remove_dir_all(path) {
        Ok(()) => tracing::debug!(dir = %path.display(), "Deleted temp directory"),
        Err(e) => tracing::warn!(dir = %path.display(), error = %e, "Failed to delete temp directory"),
    }
}

/// Delete entries in `dir` last modified more than `max_age` ago.
///
/// Stale request directories go with everything in them. Returns how many
/// entries were removed. Unreadable entries are skipped.
pub fn cleanup_old_files(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    ensure_temp_dir(dir)?;

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs_err::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable temp entry");
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age <= max_age {
            continue;
        }

        let path = entry.path();
        let deleted = if metadata.is_dir() {
            fs_err::remove_dir_all(&path)
        } else {
            fs_err::remove_file(&path)
        };
        match deleted {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(error = %e, "Failed to delete stale temp entry"),
        }
    }

    if removed > 0 {
        tracing::info!(removed, dir = %dir.display(), "Temp sweep removed stale files");
    }

    Ok(removed)
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path, "--version").await {
        missing.push(format!("{} - required for YouTube extraction", yt_dlp_path));
    }

    // yt-dlp needs ffmpeg for the mp3 conversion step
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required for audio conversion".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(50 * 1024 * 1024), "50.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(9), "0:09");
        assert_eq!(format_duration(125), "2:05");
        assert_eq!(format_duration(600), "10:00");
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_secs(0)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(ceil_secs(Duration::from_secs(42)), 42);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("رفع الملفات", 3), "رفع");
    }

    #[test]
    fn test_cleanup_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp3");
        fs_err::write(&file, b"x").unwrap();

        cleanup_file(&file);
        assert!(!file.exists());
        cleanup_file(&file);
    }

    #[test]
    fn test_cleanup_dir_removes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("req");
        fs_err::create_dir(&work).unwrap();
        fs_err::write(work.join("abc.webm.part"), b"x").unwrap();

        cleanup_dir(&work);
        assert!(!work.exists());
        assert!(dir.path().exists());
        cleanup_dir(&work);
    }

    #[test]
    fn test_cleanup_old_files_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("fresh.mp3"), b"x").unwrap();
        fs_err::create_dir(dir.path().join("nested")).unwrap();
        fs_err::write(dir.path().join("nested").join("abc.mp3"), b"x").unwrap();

        let removed = cleanup_old_files(dir.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 0);
        assert!(dir.path().join("fresh.mp3").exists());

        std::thread::sleep(Duration::from_millis(50));
        let removed = cleanup_old_files(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("nested").exists());
    }
}
