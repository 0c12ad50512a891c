use std::path::Path;
use tracing::{info, warn};

/// Reads the grounding text. A missing or unreadable file is not fatal and
/// yields an empty string.
pub fn load<P: AsRef<Path>>(path: Option<P>, max_chars: usize) -> String {
    let Some(path) = path else {
        return String::new();
    };
    let path = path.as_ref();

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Knowledge base not loaded, continuing without grounding"
            );
            return String::new();
        }
    };

    let text = truncate_chars(text.trim(), max_chars);
    info!(path = %path.display(), chars = text.chars().count(), "Loaded knowledge base");
    text
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            warn!(max_chars, "Knowledge base truncated");
            text[..idx].to_string()
        }
        None => text.to_string(),
    }
}
