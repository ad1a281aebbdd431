/// Extension-driven content type lookup for published objects
use mime::Mime;
use std::collections::HashMap;
use std::path::Path;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Maps lowercase file extensions to MIME types
///
/// Unknown extensions resolve to `application/octet-stream`. New mappings are
/// added with [`ContentTypeTable::with_mapping`]; traversal never changes.
#[derive(Debug, Clone)]
pub struct ContentTypeTable {
    by_extension: HashMap<String, Mime>,
    fallback: Mime,
}

impl Default for ContentTypeTable {
    fn default() -> Self {
        Self::empty()
            .with_mapping("m3u8", mime_const(PLAYLIST_CONTENT_TYPE))
            .with_mapping("ts", mime_const(SEGMENT_CONTENT_TYPE))
    }
}

impl ContentTypeTable {
    /// A table that classifies everything as generic binary
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
            fallback: mime::APPLICATION_OCTET_STREAM,
        }
    }

    pub fn with_mapping(mut self, extension: &str, content_type: Mime) -> Self {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), content_type);
        self
    }

    pub fn classify(&self, path: &Path) -> &Mime {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .unwrap_or(&self.fallback)
    }
}

fn mime_const(raw: &str) -> Mime {
    raw.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
