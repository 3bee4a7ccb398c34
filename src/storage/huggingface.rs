//! HuggingFace model URLs
//!
//! Parsing of HuggingFace links to GGUF files and helpers for naming downloads.

use crate::storage::StorageError;

const HF_BASE: &str = "huggingface.co/";

/// A file in a HuggingFace repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuggingFaceUrl {
    pub repo_id: String,
    /// Path of the file inside the repo, empty when the URL names only the repo
    pub filename: String,
    pub revision: String,
}

impl HuggingFaceUrl {
    /// Parse various HuggingFace URL formats
    pub fn parse(url: &str) -> Result<Self, String> {
        // Accepted:
        // 1. https://huggingface.co/owner/repo/blob/main/model.gguf
        // 2. https://huggingface.co/owner/repo/resolve/main/model.gguf
        // 3. owner/repo/model.gguf
        // 4. owner/repo
        let url = url.trim();
        let url = url.split(['?', '#']).next().unwrap_or(url);

        let path = match url.find(HF_BASE) {
            Some(pos) => &url[pos + HF_BASE.len()..],
            None if url.contains("://") => {
                return Err(format!("Not a HuggingFace URL: {url}"));
            }
            None => url,
        };

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            return Err(format!("Could not parse HuggingFace URL: {url}"));
        }
        let repo_id = format!("{}/{}", parts[0], parts[1]);
        let rest = &parts[2..];

        if let Some(pos) = rest.iter().position(|&p| p == "blob" || p == "resolve") {
            if rest.len() > pos + 2 {
                return Ok(Self {
                    repo_id,
                    filename: rest[pos + 2..].join("/"),
                    revision: rest[pos + 1].to_string(),
                });
            }
            return Err(format!("Missing file in HuggingFace URL: {url}"));
        }

        Ok(Self {
            repo_id,
            filename: rest.join("/"),
            revision: "main".to_string(),
        })
    }

    /// Build the direct download URL for the file
    pub fn download_url(&self) -> String {
        format!(
            "https://huggingface.co/{}/resolve/{}/{}",
            self.repo_id, self.revision, self.filename
        )
    }
}

/// Turn a remote file name into a safe local file name
pub fn sanitize_local_filename(filename: &str) -> Result<String, StorageError> {
    let invalid = || StorageError::InvalidFilename(filename.to_string());

    let trimmed = filename.trim();
    let trimmed = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let flattened = trimmed
        .trim_start_matches(['/', '\\'])
        .replace('\\', "/")
        .replace('/', "__");

    let mut sanitized: String = flattened
        .chars()
        .map(|ch| {
            if matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*') || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.' || c == '_') {
        return Err(invalid());
    }
    Ok(sanitized)
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KB {
        format!("{} B", bytes)
    } else if value < KB * KB {
        format!("{:.2} KB", value / KB)
    } else if value < KB * KB * KB {
        format!("{:.2} MB", value / (KB * KB))
    } else {
        format!("{:.2} GB", value / (KB * KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve_url() {
        let url = "https://huggingface.co/Qwen/Qwen3-8B-GGUF/resolve/main/Qwen3-8B-Q4_K_M.gguf?download=true";
        let parsed = HuggingFaceUrl::parse(url).unwrap();
        assert_eq!(parsed.repo_id, "Qwen/Qwen3-8B-GGUF");
        assert_eq!(parsed.filename, "Qwen3-8B-Q4_K_M.gguf");
        assert_eq!(parsed.revision, "main");
    }

    #[test]
    fn test_parse_blob_url_with_revision() {
        let url = "https://huggingface.co/bartowski/Qwen2.5-7B-Instruct-GGUF/blob/v2/sub/model.gguf";
        let parsed = HuggingFaceUrl::parse(url).unwrap();
        assert_eq!(parsed.revision, "v2");
        assert_eq!(parsed.filename, "sub/model.gguf");
        assert_eq!(
            parsed.download_url(),
            "https://huggingface.co/bartowski/Qwen2.5-7B-Instruct-GGUF/resolve/v2/sub/model.gguf"
        );
    }

    #[test]
    fn test_parse_short_forms() {
        let parsed = HuggingFaceUrl::parse("Qwen/Qwen3-8B-GGUF/Qwen3-8B-Q4_K_M.gguf").unwrap();
        assert_eq!(parsed.repo_id, "Qwen/Qwen3-8B-GGUF");
        assert_eq!(parsed.filename, "Qwen3-8B-Q4_K_M.gguf");

        let repo_only = HuggingFaceUrl::parse("Qwen/Qwen3-8B-GGUF").unwrap();
        assert_eq!(repo_only.filename, "");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(HuggingFaceUrl::parse("model.gguf").is_err());
        assert!(HuggingFaceUrl::parse("https://example.com/a/b/c.gguf").is_err());
        assert!(HuggingFaceUrl::parse("https://huggingface.co/a/b/resolve/main").is_err());
    }

    #[test]
    fn test_sanitize_local_filename() {
        assert_eq!(
            sanitize_local_filename("Qwen3-8B-Q4_K_M.gguf").unwrap(),
            "Qwen3-8B-Q4_K_M.gguf"
        );
        assert_eq!(
            sanitize_local_filename("/sub/dir/model.gguf").unwrap(),
            "sub__dir__model.gguf"
        );
        assert_eq!(sanitize_local_filename("a:b*.gguf. ").unwrap(), "a_b_.gguf");
        assert!(sanitize_local_filename("   ").is_err());
        assert!(sanitize_local_filename("..").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
