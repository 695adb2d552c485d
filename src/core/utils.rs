use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum number of characters kept from a title in an output filename.
pub const MAX_TITLE_CHARS: usize = 200;

/// Fallback name for titles that sanitize down to nothing.
pub const UNTITLED: &str = "untitled";

/// Replaces characters that are illegal in filenames on common filesystems.
///
/// Replaced characters (each becomes `_`):
/// - `/` and `\` (path separators)
/// - `:` `*` `?` `"` `<` `>` `|` (reserved on Windows)
/// - control characters (0x00-0x1F, 0x7F)
///
/// # Example
///
/// ```
/// use tubebatch::core::utils::escape_filename;
///
/// assert_eq!(escape_filename("a/b:c*d"), "a_b_c_d");
/// ```
pub fn escape_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Turns a media title into a safe filename stem.
///
/// Illegal characters are escaped, leading/trailing whitespace and dots are trimmed
/// (Windows rejects names ending in a dot) and the result is cut to
/// [`MAX_TITLE_CHARS`] characters on a char boundary.
pub fn sanitize_title(title: &str) -> String {
    let escaped = escape_filename(title);
    let trimmed = escaped.trim_matches(|c: char| c.is_whitespace() || c == '.');
    let truncated: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    let truncated = truncated.trim_end();

    if truncated.is_empty() {
        UNTITLED.to_string()
    } else {
        truncated.to_string()
    }
}

/// Builds `<dir>/<sanitized title>.<ext>`.
pub fn build_output_path(dir: &Path, title: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", sanitize_title(title), extension))
}

/// Maps an audio container extension to the extension the finished file gets.
pub fn normalize_audio_extension(container_ext: &str) -> String {
    match container_ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4a" => "m4a".to_string(),
        "webm" | "weba" => "webm".to_string(),
        "ogg" | "opus" => "ogg".to_string(),
        "mp3" => "mp3".to_string(),
        other => other.to_string(),
    }
}

/// Atomically reserves a final output path that does not exist yet.
///
/// Tries `<stem>.<ext>`, then `<stem> (1).<ext>`, `<stem> (2).<ext>`, ... and creates an
/// empty placeholder with `create_new` so two jobs resolving to the same title cannot
/// pick the same name. The caller renames or writes over the placeholder.
pub fn reserve_unique_path(desired: &Path) -> io::Result<PathBuf> {
    let parent = desired.parent().unwrap_or_else(|| Path::new(""));
    let stem = desired
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNTITLED.to_string());
    let ext = desired.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 0u32.. {
        let name = match (n, &ext) {
            (0, Some(ext)) => format!("{stem}.{ext}"),
            (0, None) => stem.clone(),
            (n, Some(ext)) => format!("{stem} ({n}).{ext}"),
            (n, None) => format!("{stem} ({n})"),
        };
        let candidate = parent.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free output name"))
}

/// Removes a file, ignoring "not found". Logs anything else.
pub fn remove_file_quiet(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
