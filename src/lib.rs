//! The library code for the `rosebud` static site builder. A site is a
//! directory of source files, some of which are *items*: files with a YAML
//! frontmatter naming the item's title, tags, and how to build it. Building
//! the site happens in a few steps:
//!
//! 1. Cloning the source directory into the output directory
//!    ([`crate::build`])
//! 2. Parsing items from source files on disk ([`crate::item`])
//! 3. Classifying the indexed items into a tree by their tags
//!    ([`crate::tree`])
//! 4. Running each item's pipeline ([`crate::pipeline`]), e.g. converting
//!    markdown, applying a layout template, and writing the result
//!
//! The classification tree is the interesting part. The root holds the
//! untagged items; each tag which isn't "dominated" by another tag (carried
//! by a strict superset of its items) becomes a child holding the items whose
//! tags are exactly the tags on the path to it, and so on recursively. The
//! tree, along with every indexed item, is available to every template
//! ([`crate::value`]), which is how index pages are rendered.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod item;
pub mod log;
pub mod markdown;
pub mod pipeline;
pub mod tree;
pub mod util;
pub mod value;
pub mod watch;
