//! Content source backed by a directory of text documents.
//!
//! Scans `*.md`, `*.txt` and `*.html` files below a root directory
//! (hidden entries are skipped) and matches the query as a
//! case-insensitive substring of the title or body.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{ContentMatch, ContentSource};

const EXTENSIONS: &[&str] = &["md", "txt", "html", "htm"];

/// Snippet length, in characters.
const SNIPPET_CHARS: usize = 160;

/// Characters of context kept before the first match in a snippet.
const SNIPPET_LEAD: usize = 60;

/// Line width for html2text; wide enough that paragraphs stay on one line.
const HTML_TEXT_WIDTH: usize = 1000;

pub struct DirectoryContentSource {
    root: PathBuf,
    base_url: String,
}

/// A loaded document, before matching.
struct Document {
    relative: String,
    title: String,
    body: String,
}

impl DirectoryContentSource {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContentSource for DirectoryContentSource {
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContentMatch>> {
        let root = self.root.clone();
        let base_url = self.base_url.clone();
        let query = query.to_string();

        // Directory walking is blocking IO
        tokio::task::spawn_blocking(move || search_directory(&root, &base_url, &query, limit))
            .await?
    }

    fn name(&self) -> &str {
        "directory"
    }
}

fn search_directory(
    root: &Path,
    base_url: &str,
    query: &str,
    limit: usize,
) -> anyhow::Result<Vec<ContentMatch>> {
    if !root.is_dir() {
        anyhow::bail!("content directory not found: {}", root.display());
    }

    let mut documents = Vec::new();
    collect_documents(root, root, &mut documents)?;

    let query_lower = query.to_lowercase();
    let mut hits: Vec<(bool, Document)> = documents
        .into_iter()
        .filter_map(|doc| {
            let in_title = doc.title.to_lowercase().contains(&query_lower);
            let in_body = doc.body.to_lowercase().contains(&query_lower);
            (in_title || in_body).then_some((in_title, doc))
        })
        .collect();

    // Title matches first, then by path
    hits.sort_by(|(a_title, a), (b_title, b)| {
        b_title.cmp(a_title).then_with(|| a.relative.cmp(&b.relative))
    });

    Ok(hits
        .into_iter()
        .take(limit)
        .map(|(_, doc)| ContentMatch {
            url: document_url(base_url, &doc.relative),
            snippet: snippet(&doc.body, &query_lower),
            title: doc.title,
        })
        .collect())
}

fn collect_documents(root: &Path, dir: &Path, out: &mut Vec<Document>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        if path.is_dir() {
            collect_documents(root, &path, out)?;
            continue;
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let Some(extension) = extension.filter(|ext| EXTENSIONS.contains(&ext.as_str())) else {
            continue;
        };

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Skipping unreadable document {}: {e}", path.display());
                continue;
            }
        };

        let text = if matches!(extension.as_str(), "html" | "htm") {
            html_to_text(&raw)
        } else {
            raw
        };

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let title = extract_title(&text).unwrap_or_else(|| relative.clone());
        out.push(Document {
            relative,
            title,
            body: text,
        });
    }
    Ok(())
}

/// First non-empty line, without Markdown heading markers.
fn extract_title(text: &str) -> Option<String> {
    text.lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn document_url(base_url: &str, relative: &str) -> String {
    if base_url.is_empty() {
        relative.to_string()
    } else {
        format!("{base_url}/{relative}")
    }
}

/// Readable text of an HTML page. Scripts and styles are dropped and
/// entities decoded.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), HTML_TEXT_WIDTH).unwrap_or_else(|e| {
        debug!("html2text failed, indexing raw markup: {e}");
        html.to_string()
    })
}

/// Up to `SNIPPET_CHARS` characters around the first match of `query_lower`.
fn snippet(body: &str, query_lower: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");

    // Lowercasing can expand one char into several, so keep the index of
    // the source char for every char of the lowered text.
    let mut lower = String::with_capacity(collapsed.len());
    let mut origin = Vec::with_capacity(collapsed.len());
    for (index, c) in collapsed.chars().enumerate() {
        for lc in c.to_lowercase() {
            lower.push(lc);
            origin.push(index);
        }
    }

    let start_char = lower
        .find(query_lower)
        .and_then(|byte| origin.get(lower[..byte].chars().count()).copied())
        .map(|index| index.saturating_sub(SNIPPET_LEAD))
        .unwrap_or(0);

    let total = collapsed.chars().count();
    let mut out = String::new();
    if start_char > 0 {
        out.push_str("...");
    }
    out.extend(collapsed.chars().skip(start_char).take(SNIPPET_CHARS));
    if start_char + SNIPPET_CHARS < total {
        out.push_str("...");
    }
    out
}
