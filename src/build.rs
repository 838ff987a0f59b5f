//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: cloning the source directory
//! into the output directory, parsing the items ([`crate::item`]), classifying
//! the indexed items ([`crate::tree`]), running each item's pipeline
//! ([`crate::pipeline`]), and compiling stylesheets.
//!
//! Builds are incremental unless asked otherwise: the time of each build is
//! recorded in the output directory, and only files and items whose sources
//! changed since then are copied and rebuilt.

use crate::config::Config;
use crate::item::{Error as ParseError, Item, Parser as ItemParser};
use crate::log::Section;
use crate::pipeline::{self, Error as PipelineError, Site};
use crate::tree::build_tree;
use crate::value::site_context;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// The file (in the output directory) holding the time of the last build.
pub const BUILD_TIME_FILE: &str = "_build_time.txt";

/// Options for a single build.
///
/// Incremental builds only rerun the pipelines of items whose own files
/// changed. Pages rendered from the classification tree (index pages) are
/// not rerun when *another* item's tags change, so they show the old tree
/// until the next `from_scratch` build.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Delete the output directory first and rebuild everything.
    pub from_scratch: bool,
}

/// What a build did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// The number of items found in the source directory.
    pub items: usize,

    /// The number of those items which are part of the index.
    pub indexed: usize,

    /// The number of items whose pipelines were run.
    pub built: usize,

    /// The number of items skipped because nothing changed.
    pub skipped: usize,

    /// The number of source files copied into the output directory.
    pub copied: usize,
}

/// Builds the site from a [`Config`] object. This calls into
/// [`ItemParser::parse_items`], [`build_tree`], and
/// [`crate::pipeline::Pipeline::run`] which do the heavy-lifting.
pub fn build_site(config: &Config, options: &Options) -> Result<Summary> {
    let _section = Section::new("Building site");
    let started = Utc::now();
    let mut summary = Summary::default();

    if options.from_scratch {
        rmdir(&config.output_directory)?;
    }
    let last_build = match options.from_scratch {
        true => None,
        false => read_build_time(&config.output_directory),
    };
    match last_build {
        Some(time) => debug!(last_build = %time.to_rfc3339(), "building incrementally"),
        None => debug!("building everything"),
    }

    {
        let _section = Section::new(&format!(
            "Cloning '{}' into '{}'",
            config.source_directory.display(),
            config.output_directory.display()
        ));
        summary.copied = copy_dir(
            &config.source_directory,
            &config.output_directory,
            last_build,
        )?;
        info!("copied {} files", summary.copied);
    }

    let items = find_items(config)?;
    summary.items = items.len();

    let indexed: Vec<&Item> = items.iter().filter(|item| item.indexed).collect();
    summary.indexed = indexed.len();
    let tree = build_tree(&indexed);
    debug!(nodes = tree.node_count(), "classified indexed items");

    let context = site_context(&indexed, &tree);
    let site = Site {
        config,
        context: &context,
    };

    {
        let _section = Section::new("Building payloads");
        for item in &items {
            if let Some(time) = last_build {
                if !item.files.iter().any(|file| modified_since(file, time)) {
                    debug!(
                        "skipping '{}' because it has not changed since the last build",
                        item.location.display()
                    );
                    summary.skipped += 1;
                    continue;
                }
            }

            let _section = Section::new(&format!("@ building '{}'", item.location.display()));
            item.pipeline
                .run(item, &site)
                .map_err(|err| Error::Pipeline {
                    location: item.location.clone(),
                    err,
                })?;
            summary.built += 1;
        }
        info!(
            "built {} items, skipped {} unchanged",
            summary.built, summary.skipped
        );
    }

    if let Some(command) = &config.stylesheet_command {
        let _section = Section::new("Compiling stylesheets");
        let output = pipeline::shell(command, &config.output_directory)
            .map_err(Error::Stylesheet)?;
        if !output.trim().is_empty() {
            debug!("{}", output.trim_end());
        }
    }

    // Recorded last so that a failed build is retried in full.
    write_build_time(&config.output_directory, started)?;
    Ok(summary)
}

/// Returns the items which are not part of the index, in location order.
pub fn unindexed(config: &Config) -> Result<Vec<Item>> {
    Ok(find_items(config)?
        .into_iter()
        .filter(|item| !item.indexed)
        .collect())
}

fn find_items(config: &Config) -> Result<Vec<Item>> {
    let _section = Section::new("Looking for items");
    let items =
        ItemParser::new(&config.source_directory, &config.item_extension).parse_items()?;
    for item in &items {
        debug!("found '{}'", item.location.display());
    }
    info!("found {} items", items.len());
    Ok(items)
}

/// Reads the time of the last build. A missing or unreadable stamp means
/// there was no usable previous build.
fn read_build_time(output_directory: &Path) -> Option<DateTime<Utc>> {
    let contents = fs::read_to_string(output_directory.join(BUILD_TIME_FILE)).ok()?;
    DateTime::parse_from_rfc3339(contents.trim())
        .map(|time| time.with_timezone(&Utc))
        .ok()
}

fn write_build_time(output_directory: &Path, time: DateTime<Utc>) -> Result<()> {
    fs::create_dir_all(output_directory)?;
    fs::write(output_directory.join(BUILD_TIME_FILE), time.to_rfc3339())?;
    Ok(())
}

/// Whether the file at `path` changed after `time`. Files which can't be
/// inspected count as changed.
fn modified_since(path: &Path, time: DateTime<Utc>) -> bool {
    match fs::metadata(path).and_then(|metadata| metadata.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified) > time,
        Err(_) => true,
    }
}

/// Copies `src` into `dst`, skipping files which haven't changed since
/// `since` and already exist in `dst`. Returns the number of files copied.
fn copy_dir(src: &Path, dst: &Path, since: Option<DateTime<Utc>>) -> Result<usize> {
    let mut copied = 0;
    let walker = WalkDir::new(src)
        .into_iter()
        .filter_entry(|entry| entry.path() != dst);
    for result in walker {
        let entry = result?;
        // strip_prefix() should never fail
        let target = dst.join(entry.path().strip_prefix(src).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        let stale = match since {
            Some(time) => modified_since(entry.path(), time) || !target.exists(),
            None => true,
        };
        if stale {
            fs::copy(entry.path(), &target).map_err(|err| Error::Copy {
                path: entry.path().to_owned(),
                err,
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn rmdir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during parsing, running
/// pipelines, cleaning the output directory, copying sources, compiling
/// stylesheets, and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors parsing items.
    Parse(ParseError),

    /// Returned when an item's pipeline fails.
    Pipeline {
        location: PathBuf,
        err: PipelineError,
    },

    /// Returned for I/O problems while cleaning the output directory.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while copying a source file.
    Copy { path: PathBuf, err: std::io::Error },

    /// Returned for errors walking the source directory.
    WalkDir(walkdir::Error),

    /// Returned when the stylesheet command fails.
    Stylesheet(PipelineError),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(err) => err.fmt(f),
            Error::Pipeline { location, err } => {
                write!(f, "Building item '{}': {}", location.display(), err)
            }
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::Copy { path, err } => {
                write!(f, "Copying '{}': {}", path.display(), err)
            }
            Error::WalkDir(err) => err.fmt(f),
            Error::Stylesheet(err) => write!(f, "Compiling stylesheets: {}", err),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(err) => Some(err),
            Error::Pipeline { location: _, err } => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::Copy { path: _, err } => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Stylesheet(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}
