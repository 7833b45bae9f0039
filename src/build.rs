//! Exports the [`Pipeline`] type which stitches together the steps of building
//! a source document: splitting off its front matter ([`crate::source`]),
//! compiling its body ([`crate::template`]), resolving its data
//! ([`crate::data`]), assembling contexts ([`crate::context`]), gating each
//! context ([`crate::gate`]), mapping output paths ([`crate::paths`]), and
//! writing the results to disk ([`crate::write`]).
//!
//! A document whose data is a collection fans out into one output per item.
//! Items name their own output file with a `filename` field; items without
//! one are named after a digest of their data, so identical items share a
//! name (and the last one written wins).

use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::context::{self, Context, Contexts, FILENAME_KEY, PATH_KEY};
use crate::data::{self, DataLoader, FsDataLoader, ResolvedData, Resolver};
use crate::gate::{BuildDecision, BuildGate, Clock, SystemClock};
use crate::paths::{self, PathMapper};
use crate::source::{self, Source};
use crate::template::{self, TemplateEngine};
use crate::write::{self, Writer};

/// The number of hex digits kept from an item's digest when naming it.
pub const CONTENT_ID_LENGTH: usize = 7;

/// Builds source documents into output files. A pipeline owns the registry of
/// deferred publication dates for its runs; see [`Pipeline::future_dates`].
pub struct Pipeline {
    config: Config,
    mapper: PathMapper,
    loader: Box<dyn DataLoader>,
    engine: Box<dyn TemplateEngine>,
    gate: BuildGate,
    writer: Writer,
}

/// What happened to one source document.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// The source document.
    pub source: PathBuf,

    /// The output files written, in collection order.
    pub written: Vec<PathBuf>,

    /// The contexts the build gate turned away, identified by their source
    /// path (or pseudo source path, for collection items).
    pub skipped: Vec<(PathBuf, BuildDecision)>,
}

impl Pipeline {
    /// Creates a pipeline reading data files from disk and gating against the
    /// wall clock.
    pub fn new(config: Config, engine: Box<dyn TemplateEngine>) -> Pipeline {
        let mapper = config.mapper();
        Pipeline {
            gate: BuildGate::with_clock(config.mode, Box::new(SystemClock)),
            writer: Writer::new(mapper.clone(), &config.site_directory),
            loader: Box::new(FsDataLoader),
            engine,
            mapper,
            config,
        }
    }

    /// Replaces the data loader.
    pub fn with_loader(mut self, loader: Box<dyn DataLoader>) -> Pipeline {
        self.loader = loader;
        self
    }

    /// Replaces the clock used to decide whether a publication date is in
    /// the future. Resets the registry.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Pipeline {
        self.gate = BuildGate::with_clock(self.config.mode, clock);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The distinct future publication dates that deferred a build so far.
    pub fn future_dates(&self) -> Vec<DateTime<Utc>> {
        self.gate.registry().dates()
    }

    /// Replaces the deferred publication dates, returning the previous ones.
    pub fn replace_future_dates(&self, dates: Vec<DateTime<Utc>>) -> Vec<DateTime<Utc>> {
        self.gate.registry().replace(dates)
    }

    /// Builds one source document. Every output of the document is written
    /// or the whole document fails.
    pub async fn create(&self, source: &Path) -> Result<BuildReport> {
        self.create_document(source)
            .await
            .map_err(|err| Error::Annotated {
                path: source.to_owned(),
                err: Box::new(err),
            })
    }

    async fn create_document(&self, source: &Path) -> Result<BuildReport> {
        let document = Source::read(source).await?;
        let template = self.engine.compile(&document.body)?;

        let resolver = Resolver::new(self.loader.as_ref(), &self.mapper);
        let site = self.site_data(&resolver).await?;
        let data = resolver.resolve(source).await?;

        let content_ids = match &data {
            ResolvedData::Record(_) => Vec::new(),
            ResolvedData::Collection(items) => items.iter().map(content_id).collect(),
        };
        let items = match context::build(data, &document.attributes, &site) {
            Contexts::Single(context) => vec![(source.to_owned(), context)],
            Contexts::Collection(contexts) => name_items(source, contexts, content_ids),
        };

        let mut report = BuildReport {
            source: source.to_owned(),
            written: Vec::new(),
            skipped: Vec::new(),
        };
        let mut rendered: Vec<(PathBuf, String)> = Vec::with_capacity(items.len());
        for (id, mut context) in items {
            let decision = self.gate.decide(&id, &context);
            if !decision.should_build() {
                report.skipped.push((id, decision));
                continue;
            }

            let target = self.mapper.map(&id)?;
            let url = self.mapper.url_path(&target)?;
            context.insert(PATH_KEY.to_owned(), Value::String(url));
            rendered.push((target, template.render(&context)?));
        }

        report.written = try_join_all(
            rendered
                .iter()
                .map(|(target, text)| self.writer.write_to(text, target)),
        )
        .await?;
        Ok(report)
    }

    /// Removes the output of a source document, cleaning up directories left
    /// empty. Fails if the output doesn't exist.
    pub async fn destroy(&self, source: &Path) -> Result<PathBuf> {
        Ok(self.writer.delete(source).await?)
    }

    /// Builds every template under the pages directory. Documents are built
    /// independently: one failing doesn't stop the others, and each result is
    /// returned alongside its source path.
    pub async fn build_all(&self) -> Result<Vec<(PathBuf, Result<BuildReport>)>> {
        let sources = self.templates()?;
        Ok(join_all(sources.into_iter().map(|source| async move {
            let result = self.create(&source).await;
            (source, result)
        }))
        .await)
    }

    /// Copies every file under the assets directory into the output
    /// directory. Like [`Pipeline::build_all`], failures are per file.
    pub async fn copy_assets(&self) -> Result<Vec<(PathBuf, Result<PathBuf>)>> {
        let files = walk_files(&self.config.assets_directory)?;
        Ok(join_all(files.into_iter().map(|file| async move {
            let result = self.writer.copy_static(&file).await.map_err(Error::from);
            (file, result)
        }))
        .await)
    }

    /// Returns the template sources under the pages directory, sorted.
    pub fn templates(&self) -> Result<Vec<PathBuf>> {
        Ok(walk_files(&self.config.pages_directory)?
            .into_iter()
            .filter(|path| self.mapper.is_template(path))
            .collect())
    }

    async fn site_data(&self, resolver: &Resolver<'_>) -> Result<Value> {
        let mut site = resolver.site_data(&self.config.site_directory).await?;
        site.insert(String::from("path"), self.config.paths_value());
        Ok(Value::Object(site))
    }
}

// Pairs each collection item with its pseudo source path,
// `{source_dir}/{filename}`, synthesizing a filename from the item's digest
// when it has none.
fn name_items(
    source: &Path,
    contexts: Vec<Context>,
    content_ids: Vec<String>,
) -> Vec<(PathBuf, Context)> {
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    let mut synthesized: HashSet<String> = HashSet::new();
    contexts
        .into_iter()
        .zip(content_ids)
        .map(|(mut context, content_id)| {
            let filename = match context.get(FILENAME_KEY) {
                Some(Value::String(name)) if !name.is_empty() => name.clone(),
                _ => {
                    if !synthesized.insert(content_id.clone()) {
                        tracing::warn!(
                            "Identical collection items in {} share the output name `{}`",
                            source.display(),
                            content_id
                        );
                    }
                    context.insert(
                        FILENAME_KEY.to_owned(),
                        Value::String(content_id.clone()),
                    );
                    content_id
                }
            };
            (dir.join(filename), context)
        })
        .collect()
}

/// Names a collection item after its data: the last
/// [`CONTENT_ID_LENGTH`] hex digits of the SHA-256 digest of its JSON
/// serialization.
pub fn content_id(item: &Map<String, Value>) -> String {
    let serialized = Value::Object(item.clone()).to_string();
    let digest = hex::encode(Sha256::digest(serialized.as_bytes()));
    digest[digest.len() - CONTENT_ID_LENGTH..].to_owned()
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    use walkdir::WalkDir;
    let mut files = Vec::new();
    for result in WalkDir::new(dir).sort_by_file_name() {
        let entry = result?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// The result of a pipeline operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building documents. Errors can come from reading the
/// source, compiling or rendering its template, resolving its data, mapping
/// its output paths, and writing or deleting output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned for errors reading or splitting a source document.
    #[error(transparent)]
    Source(#[from] source::Error),

    /// Returned for errors compiling or rendering templates.
    #[error(transparent)]
    Template(#[from] template::Error),

    /// Returned for errors loading data files.
    #[error(transparent)]
    Data(#[from] data::Error),

    /// Returned when an output path can't be derived.
    #[error(transparent)]
    Path(#[from] paths::Error),

    /// Returned for errors writing or deleting output files.
    #[error(transparent)]
    Write(#[from] write::Error),

    /// Returned for errors walking the pages or assets directories.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    /// An error with the source document it happened in.
    #[error("building `{}`: {err}", path.display())]
    Annotated {
        path: PathBuf,
        #[source]
        err: Box<Error>,
    },
}
