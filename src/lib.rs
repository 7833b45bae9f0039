//! The library code for the `orchid` static content builder. Building a source
//! document can be broken down into a handful of steps:
//!
//! 1. Splitting the document into front matter and a template body
//!    ([`crate::source`])
//! 2. Resolving the data file that applies to the document
//!    ([`crate::data`])
//! 3. Merging data, front matter and site data into one or more contexts
//!    ([`crate::context`])
//! 4. Deciding which contexts should be built at all ([`crate::gate`])
//! 5. Rendering each context and writing it to its output path
//!    ([`crate::template`], [`crate::paths`], [`crate::write`])
//!
//! The fourth and fifth steps are where a single document can turn into many
//! output files: when the resolved data is a collection, each item becomes
//! its own context, its own output path and its own file. [`crate::build`]
//! ties the steps together.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod context;
pub mod data;
pub mod gate;
pub mod paths;
pub mod source;
pub mod template;
pub mod value;
pub mod write;
