/// Template rendering and cluster definition output
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::RenderError;

/// Render `template` with `data`.
///
/// Strict mode is on so a typo in a field name fails instead of rendering
/// blank. Values are escaped for HCL quoted strings instead of HTML; every
/// `{{ }}` in the templates sits inside quotes or renders a number.
pub(crate) fn render_template<T: Serialize>(
    name: &str,
    template: &str,
    data: &T,
) -> Result<String, RenderError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(escape_hcl_string);

    handlebars
        .register_template_string(name, template)
        .map_err(|source| RenderError::Template {
            name: name.to_string(),
            source: Box::new(source),
        })?;

    handlebars
        .render(name, data)
        .map_err(|source| RenderError::Execute {
            name: name.to_string(),
            source: Box::new(source),
        })
}

/// Escape `value` for use inside an HCL quoted string, including the `${`
/// and `%{` template sequences
pub(crate) fn escape_hcl_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                escaped.push(c);
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }

    escaped
}

/// Tags stamped on every resource, merged over the user's tags
pub(crate) fn managed_tags(user_tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut tags = user_tags.clone();
    tags.insert("managed-by".to_string(), "railyard".to_string());
    tags.insert(
        "railyard-version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    tags
}

/// Worker pool view shared by the backend templates
#[derive(Debug, Serialize)]
pub(crate) struct PoolData<'a> {
    pub name: &'a str,
    pub size: &'a str,
    pub count: u32,
    pub labels: &'a BTreeMap<String, String>,
    pub has_labels: bool,
    pub taints: &'a [String],
    pub has_taints: bool,
    pub tags: &'a BTreeMap<String, String>,
    pub has_tags: bool,
}

impl<'a> PoolData<'a> {
    pub fn new(
        name: &'a str,
        size: &'a str,
        count: u32,
        labels: &'a BTreeMap<String, String>,
        taints: &'a [String],
        tags: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            name,
            size,
            count,
            labels,
            has_labels: !labels.is_empty(),
            taints,
            has_taints: !taints.is_empty(),
            tags,
            has_tags: !tags.is_empty(),
        }
    }
}

/// A writable output that reports errors when it is closed
pub(crate) trait Sink: Write {
    fn close(self) -> io::Result<()>;
}

impl Sink for File {
    fn close(self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Create `root` and write `contents` to `root/file_name`
pub(crate) fn write_config_file(
    root: &Path,
    file_name: &str,
    contents: &str,
) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(root).map_err(|source| RenderError::CreateDir {
        path: root.to_path_buf(),
        source,
    })?;

    let path = root.join(file_name);
    let file = File::create(&path).map_err(|source| RenderError::CreateFile {
        path: path.clone(),
        source,
    })?;

    write_and_close(file, &path, contents)?;
    Ok(path)
}

pub(crate) fn write_and_close<S: Sink>(
    mut sink: S,
    path: &Path,
    contents: &str,
) -> Result<(), RenderError> {
    sink.write_all(contents.as_bytes())
        .and_then(|_| sink.flush())
        .map_err(|source| RenderError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    sink.close().map_err(|source| RenderError::Close {
        path: path.to_path_buf(),
        source,
    })
}
