//! Loads project configuration from `orchid.yaml`. Every key is optional:
//!
//! ```yaml
//! output: ./build
//! site: ./site
//! pages: "{{site}}/pages"
//! partials: "{{site}}/partials"
//! assets: "{{site}}/assets"
//! template_extension: hbs
//! mode: development
//! ```
//!
//! `{{site}}` is replaced with the `site` value, and relative paths are
//! resolved against the directory containing `orchid.yaml`.

use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::gate::Mode;
use crate::paths::{PathMapper, DEFAULT_TEMPLATE_EXTENSION};

/// The name of the project file.
pub const PROJECT_FILE: &str = "orchid.yaml";

const SITE_PLACEHOLDER: &str = "{{site}}";

#[derive(Deserialize, Default)]
struct Project {
    output: Option<String>,
    site: Option<String>,
    pages: Option<String>,
    partials: Option<String>,
    assets: Option<String>,
    template_extension: Option<String>,

    #[serde(default)]
    mode: Mode,
}

/// Resolved project configuration. All directories are absolute when the
/// project root is.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The directory holding `orchid.yaml` (or the working directory when
    /// there is none).
    pub root_directory: PathBuf,
    pub output_directory: PathBuf,
    pub site_directory: PathBuf,

    /// Template sources. Their layout under this directory is mirrored in the
    /// output directory.
    pub pages_directory: PathBuf,
    pub partials_directory: PathBuf,

    /// Static files copied verbatim into the output directory.
    pub assets_directory: PathBuf,

    /// The suffix marking template sources, without the dot.
    pub template_extension: String,
    pub mode: Mode,
}

impl Config {
    /// Searches `dir` and its ancestors for `orchid.yaml` and loads the first
    /// one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path)
                .with_context(|| format!("Loading configuration from `{}`", path.display()))
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    /// Loads configuration from a project file.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let mut contents = String::new();
        File::open(path)
            .with_context(|| format!("Opening project file `{}`", path.display()))?
            .read_to_string(&mut contents)?;
        let project: Option<Project> = match contents.trim().is_empty() {
            true => None,
            false => serde_yaml::from_str(&contents)?,
        };
        match path.parent() {
            None => Err(anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )),
            Some(project_root) => Ok(Config::from_project(
                project.unwrap_or_default(),
                project_root,
            )),
        }
    }

    /// Default configuration rooted at `root`.
    pub fn with_defaults(root: &Path) -> Config {
        Config::from_project(Project::default(), root)
    }

    fn from_project(project: Project, root: &Path) -> Config {
        let site = project.site.unwrap_or_else(|| String::from("./site"));
        let resolve = |value: Option<String>, default: &str| -> PathBuf {
            let value = value.unwrap_or_else(|| default.to_owned());
            normalize(&root.join(value.replace(SITE_PLACEHOLDER, &site)))
        };

        Config {
            root_directory: root.to_owned(),
            output_directory: resolve(project.output, "./build"),
            site_directory: normalize(&root.join(&site)),
            pages_directory: resolve(project.pages, "{{site}}/pages"),
            partials_directory: resolve(project.partials, "{{site}}/partials"),
            assets_directory: resolve(project.assets, "{{site}}/assets"),
            template_extension: project
                .template_extension
                .map(|ext| ext.trim_start_matches('.').to_owned())
                .unwrap_or_else(|| DEFAULT_TEMPLATE_EXTENSION.to_owned()),
            mode: project.mode,
        }
    }

    /// Lets `ORCHID_ENV` override the configured mode.
    pub fn with_env_mode(mut self) -> Config {
        if let Some(mode) = Mode::from_env() {
            self.mode = mode;
        }
        self
    }

    /// The path mapper for this project.
    pub fn mapper(&self) -> PathMapper {
        PathMapper::new(&self.pages_directory, &self.output_directory)
            .with_template_extension(&self.template_extension)
    }

    /// The configured directories as a mapping, exposed to templates as
    /// `site.path`.
    pub fn paths_value(&self) -> Value {
        let s = |p: &Path| p.to_string_lossy().into_owned();
        json!({
            "root": s(&self.root_directory),
            "output": s(&self.output_directory),
            "site": s(&self.site_directory),
            "pages": s(&self.pages_directory),
            "partials": s(&self.partials_directory),
            "assets": s(&self.assets_directory),
        })
    }
}

// Drops `.` components so `/project/./build` reads as `/project/build`.
fn normalize(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
