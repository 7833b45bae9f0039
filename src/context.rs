//! Assembles render contexts from a document's front matter, its resolved
//! data, and the site-wide data.
//!
//! Precedence, highest first: front matter, then the record (or collection
//! item), then site data. Site data is not flattened; it lives under the
//! reserved `site` key, which front matter and data can't override.

use serde_json::{Map, Value};

use crate::data::ResolvedData;

/// The data a template is rendered with.
pub type Context = Map<String, Value>;

/// The key holding site-wide data.
pub const SITE_KEY: &str = "site";

/// The key holding the URL path an output will be served from.
pub const PATH_KEY: &str = "path";

/// The key naming a collection item's output file.
pub const FILENAME_KEY: &str = "filename";

/// The contexts built for one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Contexts {
    /// The document's data was a single record; it renders once.
    Single(Context),

    /// The document's data was a collection; it renders once per item.
    Collection(Vec<Context>),
}

impl Contexts {
    pub fn len(&self) -> usize {
        match self {
            Contexts::Single(_) => 1,
            Contexts::Collection(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the render context(s) for a document. See the module docs for
/// precedence.
pub fn build(data: ResolvedData, front_matter: &Map<String, Value>, site: &Value) -> Contexts {
    match data {
        ResolvedData::Record(record) => Contexts::Single(layer(record, front_matter, site)),
        ResolvedData::Collection(items) => Contexts::Collection(
            items
                .into_iter()
                .map(|item| layer(item, front_matter, site))
                .collect(),
        ),
    }
}

fn layer(data: Map<String, Value>, front_matter: &Map<String, Value>, site: &Value) -> Context {
    let mut context = data;
    for (key, value) in front_matter {
        context.insert(key.clone(), value.clone());
    }
    context.insert(SITE_KEY.to_owned(), site.clone());
    context
}
