//! The seam between the pipeline and the template engine. The pipeline only
//! needs to compile a template body once and render it with many contexts;
//! [`TemplateEngine`] and [`CompiledTemplate`] capture exactly that.
//! [`GtmplEngine`] implements them with [`gtmpl`] (Go template syntax, e.g.
//! `{{.title}}`, `{{range .items}}...{{end}}`, `{{template "header" .}}`).

use gtmpl::Template;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::value;

/// Compiles template source text.
pub trait TemplateEngine: Send + Sync {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>>;
}

/// A compiled template: a pure function from a context to text.
pub trait CompiledTemplate {
    fn render(&self, context: &Context) -> Result<String>;
}

/// A [`TemplateEngine`] backed by [`gtmpl`]. Partials are appended to every
/// compiled body as `{{define}}` blocks so pages can pull them in with
/// `{{template "name" .}}`.
#[derive(Debug, Clone, Default)]
pub struct GtmplEngine {
    partials: Vec<(String, String)>,
}

impl GtmplEngine {
    pub fn new() -> GtmplEngine {
        GtmplEngine::default()
    }

    /// Registers a partial under `name`.
    pub fn with_partial(mut self, name: &str, source: &str) -> GtmplEngine {
        self.partials.push((name.to_owned(), source.to_owned()));
        self
    }

    /// Registers every file under `dir` as a partial. A partial's name is its
    /// path relative to `dir`, `/`-separated, less its final extension:
    /// `partials/layout/header.hbs` is `layout/header`. A missing directory
    /// registers nothing.
    pub fn load_partials(mut self, dir: &Path) -> Result<GtmplEngine> {
        if !dir.is_dir() {
            return Ok(self);
        }

        use walkdir::WalkDir;
        let mut partials = Vec::new();
        for result in WalkDir::new(dir).sort_by_file_name() {
            let entry = result?;
            if !entry.file_type().is_file() {
                continue;
            }
            // strip_prefix() should never fail since `dir` is always an
            // ancestor of the entry
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let name = partial_name(relative);
            let source =
                std::fs::read_to_string(entry.path()).map_err(|err| Error::ReadPartial {
                    path: entry.path().to_owned(),
                    err,
                })?;
            partials.push((name, source));
        }
        tracing::debug!("registered {} partials from {}", partials.len(), dir.display());
        self.partials.extend(partials);
        Ok(self)
    }
}

fn partial_name(relative: &Path) -> String {
    let without_extension = relative.with_extension("");
    without_extension
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl TemplateEngine for GtmplEngine {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>> {
        let mut contents = String::with_capacity(source.len());
        contents.push_str(source);
        for (name, partial) in &self.partials {
            contents.push_str(&format!("{{{{define \"{}\"}}}}{}{{{{end}}}}", name, partial));
        }

        let mut template = Template::default();
        template
            .parse(contents)
            .map_err(|e| Error::Compile(e.to_string()))?;
        Ok(Box::new(GtmplTemplate(template)))
    }
}

struct GtmplTemplate(Template);

impl CompiledTemplate for GtmplTemplate {
    fn render(&self, context: &Context) -> Result<String> {
        let context = gtmpl::Context::from(value::from_map(context))
            .map_err(|e| Error::Render(e.to_string()))?;
        let mut out: Vec<u8> = Vec::new();
        self.0
            .execute(&mut out, &context)
            .map_err(|e| Error::Render(e.to_string()))?;
        String::from_utf8(out).map_err(|e| Error::Render(e.to_string()))
    }
}

/// The result of a template operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error compiling or rendering a template.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the template source doesn't parse.
    #[error("compiling template: {0}")]
    Compile(String),

    /// Returned when evaluating the template fails.
    #[error("rendering template: {0}")]
    Render(String),

    /// Returned when a partial can't be read.
    #[error("reading partial `{}`: {err}", path.display())]
    ReadPartial {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when walking the partials directory fails.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
}
