//! Container image rewriting in Kubernetes manifests.
//!
//! Two strategies, selected by [`EditMode`]:
//!
//! - **Structural**: every YAML document is parsed, the container is found
//!   by name in the workload's pod spec, and only that `image:` scalar is
//!   replaced in the original text. Comments, quoting and key order are
//!   preserved. The edited document is parsed again to verify the result.
//! - **Line**: every `image:` line whose repository matches is rewritten,
//!   without parsing.

use serde_yaml::Value;
use std::ops::Range;
use tagflow_core::EditMode;

/// Pod spec locations, relative to a document root, searched for containers.
const POD_SPEC_PATHS: &[&[&str]] = &[
    // Deployment, StatefulSet, DaemonSet, ReplicaSet, Job
    &["spec", "template", "spec"],
    // Pod
    &["spec"],
    // CronJob
    &["spec", "jobTemplate", "spec", "template", "spec"],
];

const CONTAINER_LISTS: &[&str] = &["containers", "initContainers"];

/// Which image field to rewrite, and to what.
#[derive(Debug, Clone, Copy)]
pub struct ImageEdit<'a> {
    /// Container name (structural mode)
    pub container: &'a str,
    /// Repository name, e.g. `vprofileapp2` (line mode)
    pub repository: &'a str,
    /// New image reference, e.g. `someuser/vprofileapp2:prod-a1b2c3d`
    pub image: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// The field already holds the requested image
    Unchanged,
    /// New file content
    Changed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no image field found for container {container:?}")]
    FieldNotFound { container: String },

    #[error("no image line found for repository {repository:?}")]
    RepositoryNotFound { repository: String },

    #[error("container {container:?} is defined {count} times")]
    Ambiguous { container: String, count: usize },

    #[error("image field of container {container:?} is not in block style and cannot be edited in place")]
    Layout { container: String },

    #[error("manifest is not valid YAML")]
    Parse { source: serde_yaml::Error },

    #[error("rewritten manifest does not hold {expected} for container {container:?}")]
    Verification { container: String, expected: String },
}

/// Rewrite the image field selected by `edit` in `content`.
pub fn rewrite(content: &str, mode: EditMode, edit: &ImageEdit<'_>) -> Result<Rewrite, ManifestError> {
    match mode {
        EditMode::Structural => rewrite_structural(content, edit),
        EditMode::Line => rewrite_lines(content, edit),
    }
}

// ── Structural ──

fn rewrite_structural(content: &str, edit: &ImageEdit<'_>) -> Result<Rewrite, ManifestError> {
    let lines = Lines::new(content);
    let documents = lines.documents();

    let mut found: Vec<(usize, Option<String>)> = Vec::new();
    for (index, range) in documents.iter().enumerate() {
        if range.clone().all(|i| is_blank_or_comment(lines.text(i))) {
            continue;
        }
        let doc = parse_document(&lines.join(range.clone()))?;
        for container in find_containers(&doc, edit.container) {
            let image = container
                .get("image")
                .and_then(Value::as_str)
                .map(str::to_owned);
            found.push((index, image));
        }
    }

    let (doc_index, current) = match found.as_slice() {
        [] => {
            return Err(ManifestError::FieldNotFound {
                container: edit.container.to_owned(),
            });
        }
        [single] => single.clone(),
        many => {
            return Err(ManifestError::Ambiguous {
                container: edit.container.to_owned(),
                count: many.len(),
            });
        }
    };

    let Some(current) = current else {
        return Err(ManifestError::FieldNotFound {
            container: edit.container.to_owned(),
        });
    };
    if current == edit.image {
        return Ok(Rewrite::Unchanged);
    }

    let range = documents[doc_index].clone();
    let image_line = locate_image_line(&lines, range.clone(), edit.container)?;
    let updated = lines.replace_values(&[image_line], edit.image);

    // verify against a fresh parse of the edited document
    let updated_lines = Lines::new(&updated);
    let doc = parse_document(&updated_lines.join(range))?;
    let verified = find_containers(&doc, edit.container)
        .into_iter()
        .any(|c| c.get("image").and_then(Value::as_str) == Some(edit.image));
    if !verified {
        return Err(ManifestError::Verification {
            container: edit.container.to_owned(),
            expected: edit.image.to_owned(),
        });
    }

    Ok(Rewrite::Changed(updated))
}

fn parse_document(text: &str) -> Result<Value, ManifestError> {
    serde_yaml::from_str(text).map_err(|e| ManifestError::Parse { source: e })
}

/// Container mappings named `name` in any known pod spec of `doc`.
fn find_containers<'v>(doc: &'v Value, name: &str) -> Vec<&'v Value> {
    let mut out = Vec::new();
    for path in POD_SPEC_PATHS {
        let Some(pod_spec) = path.iter().try_fold(doc, |v, key| v.get(*key)) else {
            continue;
        };
        for list in CONTAINER_LISTS {
            let Some(containers) = pod_spec.get(*list).and_then(Value::as_sequence) else {
                continue;
            };
            out.extend(
                containers
                    .iter()
                    .filter(|c| c.get("name").and_then(Value::as_str) == Some(name)),
            );
        }
    }
    out
}

/// Find the `image:` line of the sequence item whose `name:` is `container`.
fn locate_image_line(
    lines: &Lines<'_>,
    range: Range<usize>,
    container: &str,
) -> Result<usize, ManifestError> {
    let mut hits = Vec::new();

    for i in range.clone() {
        let Some(line) = KeyLine::parse(lines.text(i)) else {
            continue;
        };
        if line.key != "name" || unquote(line.value) != container {
            continue;
        }
        let Some(start) = item_start(lines, range.start, i, &line) else {
            continue;
        };
        if let Some(image) = item_key_line(lines, start, range.end, line.key_col, "image") {
            if !hits.contains(&image) {
                hits.push(image);
            }
        }
    }

    match hits.as_slice() {
        [single] => Ok(*single),
        [] => Err(ManifestError::Layout {
            container: container.to_owned(),
        }),
        many => Err(ManifestError::Ambiguous {
            container: container.to_owned(),
            count: many.len(),
        }),
    }
}

/// Index of the `- ` line that opens the sequence item containing line `at`.
fn item_start(lines: &Lines<'_>, floor: usize, at: usize, line: &KeyLine<'_>) -> Option<usize> {
    if line.dash {
        return Some(at);
    }
    for j in (floor..at).rev() {
        let text = lines.text(j);
        if is_blank_or_comment(text) || indent_of(text) >= line.key_col {
            continue;
        }
        return KeyLine::parse(text)
            .filter(|l| l.dash && l.key_col == line.key_col)
            .map(|_| j);
    }
    None
}

/// Line holding `key` at `key_col` inside the item that starts at `start`.
fn item_key_line(
    lines: &Lines<'_>,
    start: usize,
    end: usize,
    key_col: usize,
    key: &str,
) -> Option<usize> {
    for j in start..end {
        let text = lines.text(j);
        if j > start {
            if is_blank_or_comment(text) {
                continue;
            }
            if indent_of(text) < key_col {
                break;
            }
        }
        if let Some(l) = KeyLine::parse(text) {
            if l.key == key && l.key_col == key_col && l.dash == (j == start) {
                return Some(j);
            }
        }
    }
    None
}

// ── Line ──

fn rewrite_lines(content: &str, edit: &ImageEdit<'_>) -> Result<Rewrite, ManifestError> {
    let lines = Lines::new(content);
    let mut targets = Vec::new();
    let mut matched = 0usize;

    for i in 0..lines.len() {
        let Some(line) = KeyLine::parse(lines.text(i)) else {
            continue;
        };
        if line.key != "image" || !matches_repository(unquote(line.value), edit.repository) {
            continue;
        }
        matched += 1;
        if unquote(line.value) != edit.image {
            targets.push(i);
        }
    }

    if matched == 0 {
        return Err(ManifestError::RepositoryNotFound {
            repository: edit.repository.to_owned(),
        });
    }
    if targets.is_empty() {
        return Ok(Rewrite::Unchanged);
    }

    Ok(Rewrite::Changed(lines.replace_values(&targets, edit.image)))
}

/// Whether the image reference names `repository`, compared by trailing
/// path segments: `team/app` matches `ghcr.io/team/app:v1`, not `ghcr.io/myteam/app:v1`.
pub fn matches_repository(image: &str, repository: &str) -> bool {
    let name = image_name(image);
    match name.strip_suffix(repository) {
        Some("") => true,
        Some(rest) => rest.ends_with('/'),
        None => false,
    }
}

/// Image reference without tag or digest:
/// `docker.io/someuser/vprofileapp2:v1@sha256:…` → `docker.io/someuser/vprofileapp2`.
fn image_name(image: &str) -> &str {
    let without_digest = match image.split_once('@') {
        Some((name, _)) => name,
        None => image,
    };
    match (without_digest.rfind(':'), without_digest.rfind('/')) {
        (Some(colon), Some(slash)) if colon > slash => &without_digest[..colon],
        (Some(colon), None) => &without_digest[..colon],
        _ => without_digest,
    }
}

// ── Text helpers ──

/// Manifest text split into lines, keeping line endings for reassembly.
struct Lines<'a> {
    raw: Vec<&'a str>,
}

impl<'a> Lines<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            raw: content.split_inclusive('\n').collect(),
        }
    }

    fn len(&self) -> usize {
        self.raw.len()
    }

    /// Line content without its terminator.
    fn text(&self, i: usize) -> &'a str {
        self.raw[i].trim_end_matches(['\n', '\r'])
    }

    /// Line ranges of each YAML document, separators excluded.
    fn documents(&self) -> Vec<Range<usize>> {
        let mut docs = Vec::new();
        let mut start = 0;
        for i in 0..self.len() {
            if is_document_separator(self.text(i)) {
                docs.push(start..i);
                start = i + 1;
            }
        }
        docs.push(start..self.len());
        docs
    }

    fn join(&self, range: Range<usize>) -> String {
        self.raw[range].concat()
    }

    /// Content with the value of each key line in `targets` replaced by
    /// `value`, keeping indentation, quoting, trailing comment and line ending.
    fn replace_values(&self, targets: &[usize], value: &str) -> String {
        let mut out = String::with_capacity(self.raw.iter().map(|l| l.len()).sum::<usize>());
        for (i, raw) in self.raw.iter().enumerate() {
            let text = self.text(i);
            match KeyLine::parse(text).filter(|_| targets.contains(&i)) {
                Some(line) => {
                    let span = line.value_span;
                    out.push_str(&text[..span.start]);
                    out.push_str(&requote(&text[span.clone()], value));
                    out.push_str(&text[span.end..]);
                    out.push_str(&raw[text.len()..]);
                }
                None => out.push_str(raw),
            }
        }
        out
    }
}

/// A `key: value` line, optionally opening a sequence item (`- key: value`).
#[derive(Debug)]
struct KeyLine<'a> {
    dash: bool,
    /// Column where the key starts
    key_col: usize,
    key: &'a str,
    /// Raw value, quotes included, trailing comment excluded
    value: &'a str,
    value_span: Range<usize>,
}

impl<'a> KeyLine<'a> {
    fn parse(text: &'a str) -> Option<Self> {
        let indent = indent_of(text);
        let mut col = indent;
        let mut dash = false;

        if text[col..].starts_with("- ") {
            dash = true;
            col += 1;
            col += text[col..].len() - text[col..].trim_start_matches(' ').len();
        }

        let rest = &text[col..];
        if rest.is_empty() || rest.starts_with('#') {
            return None;
        }

        let colon = key_colon(rest)?;
        let key = &rest[..colon];
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }

        let after = &rest[colon + 1..];
        let value_offset = col + colon + 1 + (after.len() - after.trim_start().len());
        let value_len = value_len(&text[value_offset..]);
        let value_span = value_offset..value_offset + value_len;

        Some(Self {
            dash,
            key_col: col,
            key,
            value: &text[value_span.clone()],
            value_span,
        })
    }
}

/// Byte offset of the `:` ending a plain mapping key.
fn key_colon(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    (0..bytes.len()).find(|&i| {
        bytes[i] == b':' && bytes.get(i + 1).is_none_or(|b| *b == b' ' || *b == b'\t')
    })
}

/// Length of a scalar value, stopping at a trailing ` #` comment.
fn value_len(value: &str) -> usize {
    if let Some(quote @ ('"' | '\'')) = value.chars().next() {
        if let Some(close) = value[1..].find(quote) {
            return close + 2;
        }
    }
    let scalar = match value.split_once(" #") {
        Some((scalar, _)) => scalar,
        None => value,
    };
    scalar.trim_end().len()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn requote(old: &str, value: &str) -> String {
    match old.chars().next() {
        Some(q @ ('"' | '\'')) if old.len() >= 2 && old.ends_with(q) => format!("{q}{value}{q}"),
        _ => value.to_owned(),
    }
}

fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start_matches(' ').len()
}

/// `---` alone, or followed by a comment, tag or inline content.
fn is_document_separator(text: &str) -> bool {
    match text.strip_prefix("---") {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', '\t']),
        None => false,
    }
}

fn is_blank_or_comment(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_line_plain() {
        let l = KeyLine::parse("        image: someuser/app:v1").unwrap();
        assert!(!l.dash);
        assert_eq!(l.key_col, 8);
        assert_eq!(l.key, "image");
        assert_eq!(l.value, "someuser/app:v1");
    }

    #[test]
    fn key_line_dash_and_comment() {
        let l = KeyLine::parse("  -   image: \"a/b:c\"  # pinned").unwrap();
        assert!(l.dash);
        assert_eq!(l.key_col, 6);
        assert_eq!(l.value, "\"a/b:c\"");
        assert_eq!(unquote(l.value), "a/b:c");
    }

    #[test]
    fn key_line_ignores_comments_and_scalars() {
        assert!(KeyLine::parse("# image: x").is_none());
        assert!(KeyLine::parse("  - just-a-scalar").is_none());
        assert!(KeyLine::parse("").is_none());
    }

    #[test]
    fn key_line_url_value_keeps_colons() {
        let l = KeyLine::parse("url: https://example.com:8080/x").unwrap();
        assert_eq!(l.key, "url");
        assert_eq!(l.value, "https://example.com:8080/x");
    }

    #[test]
    fn image_name_strips_tag_and_digest() {
        assert_eq!(image_name("someuser/vprofileapp2:latest"), "someuser/vprofileapp2");
        assert_eq!(image_name("vprofileapp2"), "vprofileapp2");
        assert_eq!(image_name("registry:5000/team/app"), "registry:5000/team/app");
        assert_eq!(image_name("ghcr.io/team/app:v1@sha256:abc"), "ghcr.io/team/app");
    }

    #[test]
    fn repository_matches_whole_trailing_segments() {
        assert!(matches_repository("someuser/vprofileapp2:latest", "vprofileapp2"));
        assert!(matches_repository("vprofileapp2:latest", "vprofileapp2"));
        assert!(matches_repository("someuser/team/vprofileapp2:latest", "team/vprofileapp2"));
        assert!(!matches_repository("someuser/myteam/vprofileapp2:latest", "team/vprofileapp2"));
        assert!(!matches_repository("someuser/xvprofileapp2:latest", "vprofileapp2"));
        assert!(!matches_repository("someuser/vprofileapp2-old:latest", "vprofileapp2"));
    }

    #[test]
    fn separators_may_carry_comments_or_tags() {
        assert!(is_document_separator("---"));
        assert!(is_document_separator("--- # deployment"));
        assert!(is_document_separator("--- !tag"));
        assert!(is_document_separator("---\t"));
        assert!(!is_document_separator("----"));
        assert!(!is_document_separator("---x"));
        assert!(!is_document_separator("  ---"));
    }

    #[test]
    fn documents_split_on_separators() {
        let lines = Lines::new("a: 1\n---\nb: 2\n---\n");
        assert_eq!(lines.documents(), vec![0..1, 2..3, 4..4]);
    }

    #[test]
    fn replace_value_keeps_crlf_and_quotes() {
        let lines = Lines::new("x: 1\r\n  image: 'a/b:old' # c\r\n");
        let out = lines.replace_values(&[1], "a/b:new");
        assert_eq!(out, "x: 1\r\n  image: 'a/b:new' # c\r\n");
    }
}
