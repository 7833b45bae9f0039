//! Defines the [`Source`] type and the front-matter splitter. A source
//! document may open with a YAML block fenced by `---` lines:
//!
//! ```md
//! ---
//! title: Hello, world!
//! publication_date: 2021-04-16
//! ---
//! <h1>{{.title}}</h1>
//! ```
//!
//! The closing fence may also be `...`. Documents without both fences have no
//! attributes; the whole text is the template body.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const FENCE: &str = "---";
const END_FENCE: &str = "...";
const BOM: char = '\u{feff}';

/// A source document split into its front-matter attributes and its template
/// body.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// The attributes parsed from the front matter. Empty when the document
    /// has none.
    pub attributes: Map<String, Value>,

    /// Everything after the closing fence.
    pub body: String,
}

impl Source {
    /// Reads and splits the source document at `path`.
    pub async fn read(path: &Path) -> Result<Source> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| Error::Read {
                path: path.to_owned(),
                err,
            })?;
        split(&contents)
    }
}

/// Splits raw document text into front matter and body. A leading byte order
/// mark is ignored.
pub fn split(input: &str) -> Result<Source> {
    let input = input.strip_prefix(BOM).unwrap_or(input);
    let (yaml, body) = match frontmatter_bounds(input) {
        None => {
            return Ok(Source {
                attributes: Map::new(),
                body: input.to_owned(),
            })
        }
        Some((yaml_start, yaml_stop, body_start)) => {
            (&input[yaml_start..yaml_stop], &input[body_start..])
        }
    };

    if yaml.trim().is_empty() {
        return Ok(Source {
            attributes: Map::new(),
            body: body.to_owned(),
        });
    }

    let attributes = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        _ => return Err(Error::NotAMapping),
    };

    Ok(Source {
        attributes,
        body: body.to_owned(),
    })
}

// Returns `(yaml_start, yaml_stop, body_start)` when the input opens with a
// fence line and a closing fence (`---` or `...`) follows. Fences must occupy
// a whole line. Without a closing fence there is no front matter.
fn frontmatter_bounds(input: &str) -> Option<(usize, usize, usize)> {
    let first_line_end = input.find('\n').unwrap_or(input.len());
    if input[..first_line_end].trim_end() != FENCE {
        return None;
    }

    let yaml_start = (first_line_end + 1).min(input.len());
    let mut offset = yaml_start;
    for line in input[yaml_start..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == FENCE || trimmed == END_FENCE {
            return Some((yaml_start, offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

/// Represents the result of splitting a source document.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error reading or splitting a source document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the front matter parses as YAML but isn't a mapping.
    #[error("front matter must be a mapping")]
    NotAMapping,

    /// Returned when the front matter isn't valid YAML.
    #[error("parsing front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Returned when the source file can't be read.
    #[error("reading source `{}`: {err}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

impl Error {
    /// Whether this error means the source file doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Read { err, .. } if err.kind() == std::io::ErrorKind::NotFound)
    }
}
