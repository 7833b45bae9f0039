//! Resolves the structured data that accompanies a source document. Data lives
//! in files next to the source; for `blog/post.md.hbs` the candidates are, in
//! order:
//!
//! 1. `blog/post.md.data.yaml`, then `blog/post.md.data.json`
//! 2. `blog/post.data.yaml`, then `blog/post.data.json`
//! 3. `blog/blog.data.yaml`, then `blog/blog.data.json`
//! 4. `blog/index.data.yaml`, then `blog/index.data.json`
//! 5. `blog/data.yaml`, then `blog/data.json`
//!
//! The first candidate that exists wins and the rest are ignored. A missing
//! candidate moves on to the next one; any other failure to load a candidate
//! (bad syntax, wrong shape, I/O) is an error.
//!
//! Loading goes through the [`DataLoader`] trait so that data can come from
//! somewhere other than the filesystem (computed in-process, fetched
//! asynchronously, etc). Every loader returns a future, whether or not its work
//! is actually asynchronous.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::paths::PathMapper;

/// Data loaded for a source document: either one record or a collection of
/// records. A collection fans the document out into one output per record.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedData {
    Record(Map<String, Value>),
    Collection(Vec<Map<String, Value>>),
}

impl Default for ResolvedData {
    fn default() -> Self {
        ResolvedData::Record(Map::new())
    }
}

impl ResolvedData {
    /// Interprets a loaded value. Mappings are records, sequences of mappings
    /// are collections, and `null` (e.g., an empty YAML file) is an empty
    /// record.
    pub fn from_value(value: Value) -> std::result::Result<ResolvedData, ShapeError> {
        match value {
            Value::Null => Ok(ResolvedData::default()),
            Value::Object(record) => Ok(ResolvedData::Record(record)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(ShapeError::CollectionItem {
                        index: i,
                        kind: kind(&other),
                    }),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(ResolvedData::Collection),
            other => Err(ShapeError::Scalar(kind(&other))),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ResolvedData::Collection(_))
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// The file format of a data candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
        }
    }

    fn parse(self, text: &str) -> std::result::Result<Value, LoadError> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match self {
            Format::Yaml => serde_yaml::from_str(text).map_err(LoadError::Yaml),
            Format::Json => serde_json::from_str(text).map_err(LoadError::Json),
        }
    }
}

/// One place data may be found for a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub format: Format,
}

impl Candidate {
    fn new(dir: &Path, stem: &str, format: Format) -> Candidate {
        Candidate {
            path: dir.join(format!("{}.{}", stem, format.extension())),
            format,
        }
    }
}

/// Loads a single data candidate.
pub trait DataLoader: Send + Sync {
    /// Loads `candidate`. Must return [`LoadError::NotFound`] when the
    /// candidate doesn't exist, which the resolver treats as "try the next
    /// one"; every other error aborts resolution.
    fn load<'a>(&'a self, candidate: &'a Candidate) -> BoxFuture<'a, LoadResult<ResolvedData>>;
}

/// Loads data files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDataLoader;

impl DataLoader for FsDataLoader {
    fn load<'a>(&'a self, candidate: &'a Candidate) -> BoxFuture<'a, LoadResult<ResolvedData>> {
        Box::pin(async move {
            let text = match tokio::fs::read_to_string(&candidate.path).await {
                Ok(text) => text,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(LoadError::NotFound)
                }
                Err(err) => return Err(LoadError::Io(err)),
            };
            Ok(ResolvedData::from_value(candidate.format.parse(&text)?)?)
        })
    }
}

/// Finds and loads the data for source documents.
pub struct Resolver<'a> {
    loader: &'a dyn DataLoader,
    mapper: &'a PathMapper,
}

impl<'a> Resolver<'a> {
    pub fn new(loader: &'a dyn DataLoader, mapper: &'a PathMapper) -> Resolver<'a> {
        Resolver { loader, mapper }
    }

    /// Returns the data for `source`: the contents of the first candidate
    /// that exists, or an empty record if none do.
    pub async fn resolve(&self, source: &Path) -> Result<ResolvedData> {
        for candidate in candidates(self.mapper, source)? {
            tracing::debug!("trying data candidate {}", candidate.path.display());
            match self.loader.load(&candidate).await {
                Ok(data) => {
                    tracing::debug!("using data from {}", candidate.path.display());
                    return Ok(data);
                }
                Err(LoadError::NotFound) => continue,
                Err(err) => {
                    return Err(Error::Load {
                        path: candidate.path,
                        err,
                    })
                }
            }
        }
        Ok(ResolvedData::default())
    }

    /// Loads the site-wide data file (`data.yaml` or `data.json` in the site
    /// directory). Site data must be a single record; a missing file gives an
    /// empty one.
    pub async fn site_data(&self, site_root: &Path) -> Result<Map<String, Value>> {
        for format in [Format::Yaml, Format::Json] {
            let candidate = Candidate::new(site_root, "data", format);
            match self.loader.load(&candidate).await {
                Ok(ResolvedData::Record(record)) => return Ok(record),
                Ok(ResolvedData::Collection(_)) => {
                    return Err(Error::Load {
                        path: candidate.path,
                        err: LoadError::Shape(ShapeError::SiteCollection),
                    })
                }
                Err(LoadError::NotFound) => continue,
                Err(err) => {
                    return Err(Error::Load {
                        path: candidate.path,
                        err,
                    })
                }
            }
        }
        Ok(Map::new())
    }
}

/// Returns the data candidates for `source` in the order they are tried.
/// Duplicates (a source without a secondary extension yields the same name
/// twice) are dropped.
pub fn candidates(mapper: &PathMapper, source: &Path) -> Result<Vec<Candidate>> {
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidSourceName(source.to_owned()))?;
    let with_extension = file_name
        .strip_suffix(&mapper.template_extension)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(file_name);
    let base = match with_extension.rfind('.') {
        Some(i) if i > 0 => &with_extension[..i],
        _ => with_extension,
    };

    let mut stems = vec![format!("{}.data", with_extension), format!("{}.data", base)];
    if let Some(dir_name) = dir.file_name().and_then(|name| name.to_str()) {
        stems.push(format!("{}.data", dir_name));
    }
    stems.push(String::from("index.data"));
    stems.push(String::from("data"));

    let mut candidates: Vec<Candidate> = Vec::with_capacity(stems.len() * 2);
    for stem in &stems {
        for format in [Format::Yaml, Format::Json] {
            let candidate = Candidate::new(dir, stem, format);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    Ok(candidates)
}

/// The result of loading one candidate.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Represents a failure to load one data candidate.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The candidate doesn't exist. Not fatal during resolution.
    #[error("data file not found")]
    NotFound,

    /// The candidate exists but couldn't be read.
    #[error(transparent)]
    Io(std::io::Error),

    /// The candidate isn't valid YAML.
    #[error(transparent)]
    Yaml(serde_yaml::Error),

    /// The candidate isn't valid JSON.
    #[error(transparent)]
    Json(serde_json::Error),

    /// The candidate parsed but has the wrong shape.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// A custom loader failed while producing the data.
    #[error("{0}")]
    Module(String),
}

/// Represents loaded data that is neither a record nor a collection of
/// records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("data must be a mapping or a sequence of mappings, found a {0}")]
    Scalar(&'static str),

    #[error("collection item {index} must be a mapping, found a {kind}")]
    CollectionItem { index: usize, kind: &'static str },

    #[error("site data must be a mapping, found a sequence")]
    SiteCollection,
}

/// Represents the result of resolving data.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error resolving data for a source document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a candidate exists but fails to load.
    #[error("loading data `{}`: {err}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        err: LoadError,
    },

    /// Returned when the source path has no usable file name.
    #[error("invalid source file name: {0:?}")]
    InvalidSourceName(PathBuf),
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::fs;

    fn mapper(pages: &Path) -> PathMapper {
        PathMapper::new(pages, Path::new("build"))
    }

    fn names(candidates: &[Candidate]) -> Vec<String> {
        candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_candidate_order() -> Result<()> {
        let mapper = mapper(Path::new("pages"));
        let candidates = candidates(&mapper, Path::new("pages/blog/post.md.hbs"))?;
        assert_eq!(
            names(&candidates),
            vec![
                "post.md.data.yaml",
                "post.md.data.json",
                "post.data.yaml",
                "post.data.json",
                "blog.data.yaml",
                "blog.data.json",
                "index.data.yaml",
                "index.data.json",
                "data.yaml",
                "data.json",
            ]
        );
        assert!(candidates
            .iter()
            .all(|c| c.path.parent() == Some(Path::new("pages/blog"))));
        Ok(())
    }

    #[test]
    fn test_candidates_without_secondary_extension() -> Result<()> {
        let mapper = mapper(Path::new("pages"));
        let candidates = candidates(&mapper, Path::new("pages/blog/about.hbs"))?;
        assert_eq!(
            names(&candidates),
            vec![
                "about.data.yaml",
                "about.data.json",
                "blog.data.yaml",
                "blog.data.json",
                "index.data.yaml",
                "index.data.json",
                "data.yaml",
                "data.json",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_first_existing_candidate_wins() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blog = dir.path().join("dir");
        fs::create_dir_all(&blog).unwrap();
        fs::write(blog.join("page.data.json"), r#"{"from": "page"}"#).unwrap();
        fs::write(blog.join("data.json"), r#"{"from": "directory"}"#).unwrap();

        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        let data = resolver.resolve(&blog.join("page.md.hbs")).await?;
        assert_eq!(
            data,
            ResolvedData::Record(json!({"from": "page"}).as_object().unwrap().clone())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_prefers_yaml_within_a_slot() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.data.yaml"), "from: yaml\n").unwrap();
        fs::write(dir.path().join("index.data.json"), r#"{"from": "json"}"#).unwrap();

        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        let data = resolver.resolve(&dir.path().join("page.hbs")).await?;
        assert_eq!(
            data,
            ResolvedData::Record(json!({"from": "yaml"}).as_object().unwrap().clone())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_no_candidates() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        let data = resolver.resolve(&dir.path().join("page.hbs")).await?;
        assert_eq!(data, ResolvedData::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_collection() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("data.yaml"),
            "- title: one\n- title: two\n",
        )
        .unwrap();
        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        match resolver.resolve(&dir.path().join("page.hbs")).await? {
            ResolvedData::Collection(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1]["title"], "two");
            }
            other => panic!("wanted a collection, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_syntax_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.data.json"), "{ not json").unwrap();
        fs::write(dir.path().join("data.json"), r#"{"ok": true}"#).unwrap();
        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        let err = resolver
            .resolve(&dir.path().join("page.hbs"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Load {
                err: LoadError::Json(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resolve_scalar_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.yaml"), "just a string\n").unwrap();
        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        let err = resolver
            .resolve(&dir.path().join("page.hbs"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Load {
                err: LoadError::Shape(ShapeError::Scalar("string")),
                ..
            }
        ));
    }

    /// Serves data from memory, computing each value asynchronously.
    struct MemoryLoader(HashMap<PathBuf, std::result::Result<Value, String>>);

    impl DataLoader for MemoryLoader {
        fn load<'a>(
            &'a self,
            candidate: &'a Candidate,
        ) -> BoxFuture<'a, LoadResult<ResolvedData>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                match self.0.get(&candidate.path) {
                    None => Err(LoadError::NotFound),
                    Some(Ok(value)) => Ok(ResolvedData::from_value(value.clone())?),
                    Some(Err(message)) => Err(LoadError::Module(message.clone())),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_resolve_async_loader() -> Result<()> {
        let loader = MemoryLoader(HashMap::from([(
            PathBuf::from("pages/blog/blog.data.yaml"),
            Ok(json!([{"n": 1}, {"n": 2}, {"n": 3}])),
        )]));
        let mapper = mapper(Path::new("pages"));
        let resolver = Resolver::new(&loader, &mapper);
        let data = resolver.resolve(Path::new("pages/blog/post.hbs")).await?;
        assert!(data.is_collection());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_loader_failure_is_not_skipped() {
        let loader = MemoryLoader(HashMap::from([
            (
                PathBuf::from("pages/post.data.yaml"),
                Err(String::from("boom")),
            ),
            (PathBuf::from("pages/data.yaml"), Ok(json!({"ok": true}))),
        ]));
        let mapper = mapper(Path::new("pages"));
        let resolver = Resolver::new(&loader, &mapper);
        let err = resolver
            .resolve(Path::new("pages/post.hbs"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Load {
                err: LoadError::Module(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_site_data() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper(dir.path());
        let resolver = Resolver::new(&FsDataLoader, &mapper);
        assert!(resolver.site_data(dir.path()).await?.is_empty());

        fs::write(dir.path().join("data.json"), r#"{"name": "Example"}"#).unwrap();
        assert_eq!(resolver.site_data(dir.path()).await?["name"], "Example");

        fs::write(dir.path().join("data.yaml"), "- a: 1\n").unwrap();
        assert!(resolver.site_data(dir.path()).await.is_err());
        Ok(())
    }
}
