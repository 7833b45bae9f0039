//! Derives output file paths from source paths. Everything here is a pure
//! function of its inputs; nothing touches the filesystem.
//!
//! Given a pages root of `site/pages` and an output root of `build`:
//!
//! | source                         | output                  | URL path        |
//! |--------------------------------|-------------------------|-----------------|
//! | `site/pages/about.hbs`         | `build/about.html`      | `/about.html`   |
//! | `site/pages/blog/post.md.hbs`  | `build/blog/post.md`    | `/blog/post.md` |
//! | `site/pages/blog/blog.hbs`     | `build/blog/index.html` | `/blog/`        |

use std::path::{Component, Path, PathBuf};

/// The suffix identifying template sources when none is configured.
pub const DEFAULT_TEMPLATE_EXTENSION: &str = "hbs";

const DEFAULT_OUTPUT_EXTENSION: &str = "html";
const INDEX: &str = "index";

/// Maps source paths under a pages root onto output paths under an output
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    pub pages_root: PathBuf,
    pub output_root: PathBuf,

    /// The template suffix stripped from source file names, without the
    /// leading dot.
    pub template_extension: String,
}

impl PathMapper {
    pub fn new(pages_root: &Path, output_root: &Path) -> PathMapper {
        PathMapper {
            pages_root: pages_root.to_owned(),
            output_root: output_root.to_owned(),
            template_extension: DEFAULT_TEMPLATE_EXTENSION.to_owned(),
        }
    }

    pub fn with_template_extension(mut self, extension: &str) -> PathMapper {
        self.template_extension = extension.trim_start_matches('.').to_owned();
        self
    }

    /// Returns the output path for `source`. The source's directory relative
    /// to the pages root is kept; the file name loses its template suffix and
    /// its secondary extension (if any) becomes the output extension,
    /// defaulting to `.html`. A name matching its containing directory becomes
    /// `index`.
    pub fn map(&self, source: &Path) -> Result<PathBuf> {
        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        let relative_dir = dir
            .strip_prefix(&self.pages_root)
            .map_err(|_| Error::OutsidePagesRoot {
                path: source.to_owned(),
                pages_root: self.pages_root.to_owned(),
            })?;
        if relative_dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::EscapesPagesRoot(source.to_owned()));
        }

        let (stem, extension) = self.split_file_name(source)?;
        let stem = match dir.file_name() {
            Some(dir_name) if dir_name.to_str() == Some(stem) => INDEX,
            _ => stem,
        };

        Ok(self
            .output_root
            .join(relative_dir)
            .join(format!("{}.{}", stem, extension)))
    }

    /// Returns the output file stem and extension for `source`, e.g.
    /// `("post", "md")` for `post.md.hbs` and `("about", "html")` for
    /// `about.hbs`.
    pub fn split_file_name<'a>(&self, source: &'a Path) -> Result<(&'a str, &'a str)> {
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidFileName(source.to_owned()))?;
        let name = strip_extension(file_name, &self.template_extension).unwrap_or(file_name);
        Ok(match secondary_extension(name) {
            Some((stem, extension)) => (stem, extension),
            None => (name, DEFAULT_OUTPUT_EXTENSION),
        })
    }

    /// Whether `path` names a template source.
    pub fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| strip_extension(name, &self.template_extension))
            .is_some()
    }

    /// Returns the root-relative URL path for `output`. See [`url_path`].
    pub fn url_path(&self, output: &Path) -> Result<String> {
        url_path(output, &self.output_root)
    }
}

/// Maps `source` with the default template suffix. See [`PathMapper::map`].
pub fn map_path(source: &Path, pages_root: &Path, output_root: &Path) -> Result<PathBuf> {
    PathMapper::new(pages_root, output_root).map(source)
}

/// Converts an output path into the URL path templates see under `path`: the
/// path relative to `output_root`, `/`-separated and `/`-prefixed, with a
/// trailing `index.html` trimmed so directory indexes read as `/blog/`.
pub fn url_path(output: &Path, output_root: &Path) -> Result<String> {
    let relative = output
        .strip_prefix(output_root)
        .map_err(|_| Error::OutsideOutputRoot {
            output: output.to_owned(),
            output_root: output_root.to_owned(),
        })?;

    let mut url = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            url.push('/');
            url.push_str(&part.to_string_lossy());
        }
    }

    if let Some(dir) = url.strip_suffix("index.html") {
        if dir.ends_with('/') {
            return Ok(dir.to_owned());
        }
    }
    if url.is_empty() {
        url.push('/');
    }
    Ok(url)
}

fn strip_extension<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    file_name
        .strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|rest| !rest.is_empty())
}

// Splits `post.md` into `("post", "md")`. Leading-dot names like `.htaccess`
// have no extension.
fn secondary_extension(name: &str) -> Option<(&str, &str)> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(i) if i + 1 == name.len() => None,
        Some(i) => Some((&name[..i], &name[i + 1..])),
    }
}

/// Represents the result of a path mapping.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error mapping a source path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Returned when the source isn't inside the pages root.
    #[error("source `{}` is not inside the pages directory `{}`", path.display(), pages_root.display())]
    OutsidePagesRoot { path: PathBuf, pages_root: PathBuf },

    /// Returned when a source path climbs out of its directory with `..`
    /// (or similar), e.g. a collection item named `../../x`.
    #[error("source `{}` leaves the pages directory", .0.display())]
    EscapesPagesRoot(PathBuf),

    /// Returned when an output path isn't inside the output root.
    #[error("output `{}` is not inside the output directory `{}`", output.display(), output_root.display())]
    OutsideOutputRoot { output: PathBuf, output_root: PathBuf },

    /// Returned when a file name is missing or isn't valid UTF-8.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(PathBuf),
}
