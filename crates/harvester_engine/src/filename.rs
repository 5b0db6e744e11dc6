use std::path::{Path, PathBuf};

/// Character cap for the title part of an attachment name.
pub const TITLE_MAX_CHARS: usize = 60;
/// Character cap for the server-suggested part of an attachment name.
pub const FILENAME_MAX_CHARS: usize = 120;

/// `{sanitized_title}_{sanitized_suggested_name}`, with the suggested name
/// percent-decoded first.
pub fn attachment_filename(title: &str, suggested_name: &str) -> String {
    let title = sanitize_component(title, TITLE_MAX_CHARS);
    let title = if title.is_empty() {
        "untitled".to_string()
    } else {
        title
    };
    let name = sanitize_component(&decode_suggested_name(suggested_name), FILENAME_MAX_CHARS);
    let name = if name.is_empty() {
        "attachment".to_string()
    } else {
        name
    };
    format!("{title}_{name}")
}

/// Percent-decode a suggested file name. Sequences that do not decode to
/// UTF-8 leave the name untouched.
pub fn decode_suggested_name(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Drop characters that are illegal in file names on common platforms, trim,
/// and cap the result at `max_chars` characters.
pub fn sanitize_component(input: &str, max_chars: usize) -> String {
    let cleaned: String = input.chars().filter(|c| !is_forbidden(*c)).collect();
    let truncated: String = cleaned.trim().chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}' | '\u{7F}'
    )
}

/// `dir/file_name`, or the first free `dir/{stem}_{n}.{ext}` for n = 1, 2, ...
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut k: u32 = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{k}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        k += 1;
    }
}
