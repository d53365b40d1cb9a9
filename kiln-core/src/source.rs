//! Loading the site from disk.
//!
//! Items come from the content directory, layouts from the layouts
//! directory. Textual files may open with a YAML frontmatter block
//! fenced by `---` lines; everything else is treated as binary and
//! fingerprinted by size and modification time.

use crate::config::Config;
use crate::model::{BinaryRef, Content, Document, Item, Layout, Site, SiteError};
use kiln_types::{Identifier, IdentifierStyle, Value, ValueMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid frontmatter in {path}: {source}")]
    Frontmatter {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Site(#[from] SiteError),
}

/// Split a leading `---` fenced YAML block off a text document.
/// Returns the parsed attributes and the remaining body.
fn parse_frontmatter(path: &Path, text: &str) -> Result<(ValueMap, String), SourceError> {
    let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
        return Ok((ValueMap::new(), text.to_string()));
    };
    let Some(end) = rest.find("\n---").map(|i| (i, &rest[i + 1..])) else {
        return Ok((ValueMap::new(), text.to_string()));
    };
    let (yaml_len, after_fence) = end;
    let body = after_fence
        .strip_prefix("---\r\n")
        .or_else(|| after_fence.strip_prefix("---\n"))
        .or_else(|| (after_fence == "---").then_some(""));
    let Some(body) = body else {
        return Ok((ValueMap::new(), text.to_string()));
    };

    let yaml: serde_yaml::Value = serde_yaml::from_str(&rest[..yaml_len]).map_err(|source| {
        SourceError::Frontmatter {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let attributes = match Value::from(yaml) {
        Value::Map(map) => map,
        Value::Null => ValueMap::new(),
        other => {
            tracing::warn!(
                "Frontmatter in {} is not a mapping ({other:?}); ignoring",
                path.display()
            );
            ValueMap::new()
        }
    };
    Ok((attributes, body.to_string()))
}

fn identifier_for(rel: &Path, style: IdentifierStyle) -> Identifier {
    let slashed = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    match style {
        IdentifierStyle::Full => Identifier::full(format!("/{slashed}")),
        IdentifierStyle::Legacy => {
            let without_ext = match slashed.rfind('.') {
                Some(dot) if !slashed[dot..].contains('/') => &slashed[..dot],
                _ => slashed.as_str(),
            };
            // foo/index maps to /foo/, like the directory itself.
            let trimmed = without_ext.strip_suffix("index").unwrap_or(without_ext);
            Identifier::legacy(format!("/{trimmed}"))
        }
    }
}

fn load_document(
    path: &Path,
    rel: &Path,
    config: &Config,
) -> Result<Document, SourceError> {
    let io_err = |source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(io_err)?;
    let identifier = identifier_for(rel, config.identifier_style);

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (content, attributes) = if config.is_text_extension(&ext) {
        let text = std::fs::read_to_string(path).map_err(io_err)?;
        let (attributes, body) = parse_frontmatter(path, &text)?;
        (Content::text(body), attributes)
    } else {
        (
            Content::Binary(BinaryRef {
                path: path.to_path_buf(),
                size: metadata.len(),
                mtime: metadata.modified().map_err(io_err)?,
            }),
            ValueMap::new(),
        )
    };

    let mut document = Document::new(identifier, content, attributes);
    document.mtime = metadata.modified().ok();
    Ok(document)
}

fn walk_sorted(dir: &Path) -> Vec<(PathBuf, PathBuf)> {
    let mut files: Vec<(PathBuf, PathBuf)> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(dir).ok()?.to_path_buf();
            Some((entry.path().to_path_buf(), rel))
        })
        .collect();
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

/// Load items, layouts, and site code as configured.
pub fn load_site(config: &Config) -> Result<Site, SourceError> {
    let content_dir = config.content_dir();
    let mut items = Vec::new();
    if content_dir.is_dir() {
        for (path, rel) in walk_sorted(&content_dir) {
            items.push(Item::new(load_document(&path, &rel, config)?));
        }
    } else {
        tracing::warn!("Content directory {} does not exist", content_dir.display());
    }

    let layouts_dir = config.layouts_dir();
    let mut layouts = Vec::new();
    if layouts_dir.is_dir() {
        for (path, rel) in walk_sorted(&layouts_dir) {
            layouts.push(Layout::new(load_document(&path, &rel, config)?));
        }
    }

    let mut code_snippets = Vec::new();
    for code_dir in config.code_dirs() {
        for (path, _) in walk_sorted(&code_dir) {
            match std::fs::read_to_string(&path) {
                Ok(text) => code_snippets.push(text),
                Err(e) => {
                    tracing::warn!("Skipping unreadable code file {}: {e}", path.display())
                }
            }
        }
    }

    tracing::info!(
        "Loaded {} items, {} layouts, {} code snippets",
        items.len(),
        layouts.len(),
        code_snippets.len()
    );
    Ok(Site::new(items, layouts, code_snippets)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_split() {
        let (attrs, body) = parse_frontmatter(
            Path::new("/a.md"),
            "---\ntitle: Hello\ntags: [x, y]\n---\nbody here\n",
        )
        .unwrap();
        assert_eq!(attrs.get("title").and_then(Value::as_str), Some("Hello"));
        assert_eq!(body, "body here\n");
    }

    #[test]
    fn test_no_frontmatter_is_all_body() {
        let (attrs, body) =
            parse_frontmatter(Path::new("/a.md"), "just text\n").unwrap();
        assert!(attrs.is_empty());
        assert_eq!(body, "just text\n");
    }

    #[test]
    fn test_unterminated_fence_is_body() {
        let text = "---\ntitle: Hello\nno closing fence\n";
        let (attrs, body) = parse_frontmatter(Path::new("/a.md"), text).unwrap();
        assert!(attrs.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let result = parse_frontmatter(Path::new("/a.md"), "---\n[unclosed\n---\nbody\n");
        assert!(matches!(result, Err(SourceError::Frontmatter { .. })));
    }

    #[test]
    fn test_identifier_styles() {
        let rel = Path::new("posts/hello.md");
        assert_eq!(
            identifier_for(rel, IdentifierStyle::Full).as_str(),
            "/posts/hello.md"
        );
        assert_eq!(
            identifier_for(rel, IdentifierStyle::Legacy).as_str(),
            "/posts/hello/"
        );
        assert_eq!(
            identifier_for(Path::new("posts/index.md"), IdentifierStyle::Legacy).as_str(),
            "/posts/"
        );
    }

    #[test]
    fn test_load_site_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        std::fs::create_dir_all(content.join("posts")).unwrap();
        std::fs::write(
            content.join("posts/a.md"),
            "---\ntitle: A\n---\nalpha\n",
        )
        .unwrap();
        std::fs::write(content.join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47]).unwrap();

        let mut config = Config::default();
        config.content_dir = content;

        let site = load_site(&config).unwrap();
        assert_eq!(site.items().len(), 2);

        let post = site.item(&Identifier::full("/posts/a.md")).unwrap();
        assert_eq!(post.document.content.as_text(), Some("alpha\n"));
        assert_eq!(
            post.document.attributes.get("title").and_then(Value::as_str),
            Some("A")
        );

        let logo = site.item(&Identifier::full("/logo.png")).unwrap();
        assert!(!logo.document.content.is_text());
    }
}
