//! Defines the [`Item`], [`Parser`], and [`Error`] types. An item is a link
//! with metadata: a source file whose name ends with the item extension
//! (`.fm` by default) and which begins with YAML frontmatter. The rest of the
//! file is the item's payload, which the item's build pipeline turns into
//! output (see [`crate::pipeline`]).

use std::{
    collections::BTreeSet,
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use url::Url;
use walkdir::WalkDir;

use crate::{
    pipeline::{self, BuildSpec, Pipeline},
    tree::Tagged,
    util::normalize_relative,
};

/// Keys which are derived while parsing and so may not be set by hand.
const RESERVED_KEYS: &[&str] = &["payload", "location", "computed_href"];

/// A parsed item.
#[derive(Clone, Debug)]
pub struct Item {
    /// The item's title. Orders items within an index node.
    pub title: String,

    /// The item's tags.
    pub tags: BTreeSet<String>,

    /// A short description of the item (the `abstract` key).
    pub description: Option<String>,

    /// What the item links to.
    pub target: Target,

    /// The files (in the source tree) that belong to the item. An item is
    /// only rebuilt incrementally when one of these has changed.
    pub files: Vec<PathBuf>,

    /// The steps which build the item's payload.
    pub pipeline: Pipeline,

    /// Whether the item is part of the index.
    pub indexed: bool,

    /// Everything after the frontmatter.
    pub payload: String,

    /// The item's source file, relative to the source directory.
    pub location: PathBuf,

    /// The value for an `<a href>` pointing at the target.
    pub href: String,
}

impl Tagged for Item {
    fn title(&self) -> &str {
        &self.title
    }

    fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

/// The thing an item points at.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    /// A file in the site, relative to the site root.
    Path(PathBuf),

    /// Anything else, e.g. an external web page.
    Url(Url),
}

/// Parses [`Item`] objects from source files.
pub struct Parser<'a> {
    /// The directory searched for items. Item locations, targets, and hrefs
    /// are all relative to it.
    source_directory: &'a Path,

    /// The file name suffix which marks a file as an item.
    item_extension: &'a str,
}

impl<'a> Parser<'a> {
    /// Constructs a new parser. See fields on [`Parser`] for argument
    /// descriptions.
    pub fn new(source_directory: &'a Path, item_extension: &'a str) -> Parser<'a> {
        Parser {
            source_directory,
            item_extension,
        }
    }

    /// Searches the source directory recursively for item files and returns
    /// the parsed items ordered by location. Each item file must be
    /// structured as follows:
    ///
    /// 1. Initial frontmatter fence (`---`)
    /// 2. YAML frontmatter with a `title` and optionally `tags`, `abstract`,
    ///    `target`, `files`, `build`, and `indexed`
    /// 3. Terminal frontmatter fence (`---`)
    /// 4. Payload
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// title: Notes on sets
    /// tags: [math, school]
    /// target: sets.html
    /// build: markdown -> write
    /// ---
    /// # Sets
    /// ```
    pub fn parse_items(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for result in WalkDir::new(self.source_directory) {
            let entry = result?;
            if entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .ends_with(self.item_extension)
            {
                items.push(self.parse_item(
                    // strip_prefix() should never fail
                    entry.path().strip_prefix(self.source_directory).unwrap(),
                )?);
            }
        }

        items.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(items)
    }

    /// Parses a single [`Item`] from the file at `relative_path` (relative to
    /// the source directory).
    pub fn parse_item(&self, relative_path: &Path) -> Result<Item> {
        use std::io::Read;
        let mut contents = String::new();
        let result = File::open(self.source_directory.join(relative_path))
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(Error::from)
            .and_then(|_| self.parse_str(relative_path, &contents));
        match result {
            Ok(item) => Ok(item),
            Err(e) => Err(Error::Annotated(
                format!("parsing item `{}`", relative_path.display()),
                Box::new(e),
            )),
        }
    }

    /// Parses an item from `input`, the contents of the file at
    /// `relative_path`.
    pub fn parse_str(&self, relative_path: &Path, input: &str) -> Result<Item> {
        fn frontmatter_indices(input: &str) -> Result<(usize, usize, usize)> {
            const FENCE: &str = "---";
            if !input.starts_with(FENCE) {
                return Err(Error::FrontmatterMissingStartFence);
            }
            match input[FENCE.len()..].find("\n---") {
                None => Err(Error::FrontmatterMissingEndFence),
                Some(offset) => Ok((
                    FENCE.len(),                            // yaml_start
                    FENCE.len() + offset + 1,               // yaml_stop
                    FENCE.len() + offset + 1 + FENCE.len(), // body_start
                )),
            }
        }

        let (yaml_start, yaml_stop, body_start) = frontmatter_indices(input)?;
        let frontmatter = Frontmatter::parse(&input[yaml_start..yaml_stop])?;

        let body = &input[body_start..];
        let payload = body
            .strip_prefix("\r\n")
            .or_else(|| body.strip_prefix('\n'))
            .unwrap_or(body);

        let target = self.parse_target(relative_path, frontmatter.target)?;
        let item_directory = relative_path.parent().unwrap_or_else(|| Path::new(""));
        let files = match frontmatter.files {
            None => vec![self.source_directory.join(relative_path)],
            Some(files) => files
                .iter()
                .map(|file| self.source_directory.join(item_directory).join(file))
                .collect(),
        };

        Ok(Item {
            title: frontmatter.title,
            tags: frontmatter.tags.unwrap_or_default(),
            description: frontmatter.description,
            href: href(&target),
            target,
            files,
            pipeline: Pipeline::from_spec(frontmatter.build.unwrap_or_default())?,
            indexed: frontmatter.indexed.unwrap_or(true),
            payload: payload.to_owned(),
            location: relative_path.to_owned(),
        })
    }

    /// Resolves the `target` key. Absolute URLs are kept as they are; other
    /// values are paths relative to the item's directory. Without a `target`,
    /// the item points at its own location less the item extension.
    fn parse_target(&self, relative_path: &Path, target: Option<String>) -> Result<Target> {
        let target = match target {
            Some(target) => target,
            None => {
                let location = relative_path
                    .to_str()
                    .ok_or_else(|| InvalidFileNameError(relative_path.to_owned()))?;
                return Ok(Target::Path(PathBuf::from(
                    location
                        .strip_suffix(self.item_extension)
                        .unwrap_or(location),
                )));
            }
        };

        match Url::parse(&target) {
            Ok(url) => Ok(Target::Url(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let item_directory = relative_path.parent().unwrap_or_else(|| Path::new(""));
                normalize_relative(&item_directory.join(&target))
                    .map(Target::Path)
                    .ok_or(Error::TargetOutsideSite(target))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Computes the value for an `<a href>` pointing at `target`. Paths become
/// absolute links from the site root, with a trailing `index.html` dropped.
fn href(target: &Target) -> String {
    match target {
        Target::Url(url) => url.to_string(),
        Target::Path(path) => {
            let mut href = String::new();
            for component in path.components() {
                href.push('/');
                href.push_str(&component.as_os_str().to_string_lossy());
            }
            match href.strip_suffix("index.html") {
                Some(stripped) if stripped.ends_with('/') => stripped.to_owned(),
                _ => href,
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Frontmatter {
    /// The title of the item.
    title: String,

    /// The tags associated with the item. A missing or empty `tags` key
    /// means no tags.
    #[serde(default)]
    tags: Option<BTreeSet<String>>,

    /// A short description of the item.
    #[serde(default, rename = "abstract")]
    description: Option<String>,

    /// The path or URL the item points at.
    #[serde(default)]
    target: Option<String>,

    /// The files belonging to the item, relative to the item's directory.
    #[serde(default)]
    files: Option<Vec<PathBuf>>,

    /// The item's build pipeline.
    #[serde(default)]
    build: Option<BuildSpec>,

    /// Whether the item is part of the index.
    #[serde(default)]
    indexed: Option<bool>,
}

impl Frontmatter {
    fn parse(yaml: &str) -> Result<Frontmatter> {
        if yaml.trim().is_empty() {
            return Err(Error::MissingMetadata);
        }
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        match &value {
            serde_yaml::Value::Null => return Err(Error::MissingMetadata),
            serde_yaml::Value::Mapping(mapping) => {
                if mapping.is_empty() {
                    return Err(Error::MissingMetadata);
                }
                for key in RESERVED_KEYS {
                    if mapping.contains_key(&serde_yaml::Value::from(*key)) {
                        return Err(Error::ReservedKey(key.to_string()));
                    }
                }
            }
            _ => {}
        }
        Ok(serde_yaml::from_value(value)?)
    }
}

#[derive(Debug)]
pub struct InvalidFileNameError(PathBuf);

impl fmt::Display for InvalidFileNameError {
    /// Displays an [`InvalidFileNameError`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid file name: {:?}", &self.0)
    }
}

impl std::error::Error for InvalidFileNameError {
    /// Implements the [`std::error::Error`] trait for [`InvalidFileNameError`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Represents the result of an [`Item`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing an [`Item`] object.
#[derive(Debug)]
pub enum Error {
    /// Returned when an item source file is missing its starting frontmatter
    /// fence (`---`).
    FrontmatterMissingStartFence,

    /// Returned when an item source file is missing its terminal frontmatter
    /// fence (`---` i.e., the starting fence was found but the ending one was
    /// missing).
    FrontmatterMissingEndFence,

    /// Returned when the frontmatter is empty.
    MissingMetadata,

    /// Returned when the frontmatter sets a key that is derived by the
    /// parser.
    ReservedKey(String),

    /// Returned when there was an error parsing the frontmatter as YAML,
    /// including unknown keys and values of the wrong type.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when the `target` looks like a URL but can't be parsed as
    /// one.
    UrlParse(url::ParseError),

    /// Returned when a path `target` leads outside of the source directory.
    TargetOutsideSite(String),

    /// Returned when the `build` key doesn't describe a valid pipeline.
    Pipeline(pipeline::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned when a source file name isn't valid UTF-8.
    InvalidFileName(InvalidFileNameError),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterMissingStartFence => {
                write!(f, "Item must begin with `---`")
            }
            Error::FrontmatterMissingEndFence => {
                write!(f, "Missing closing `---`")
            }
            Error::MissingMetadata => write!(f, "Item has no metadata"),
            Error::ReservedKey(key) => {
                write!(f, "The key `{}` may not be specified", key)
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::TargetOutsideSite(target) => {
                write!(f, "Target `{}` is outside of the site", target)
            }
            Error::Pipeline(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::InvalidFileName(err) => err.fmt(f),
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterMissingStartFence => None,
            Error::FrontmatterMissingEndFence => None,
            Error::MissingMetadata => None,
            Error::ReservedKey(_) => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::TargetOutsideSite(_) => None,
            Error::Pipeline(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::InvalidFileName(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<InvalidFileNameError> for Error {
    fn from(err: InvalidFileNameError) -> Error {
        Error::InvalidFileName(err)
    }
}

impl From<pipeline::Error> for Error {
    fn from(err: pipeline::Error) -> Error {
        Error::Pipeline(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing functions.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking the source directory.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipeline::Step;
    use std::fs;

    fn parse(relative_path: &str, input: &str) -> Result<Item> {
        Parser::new(Path::new("/site/src"), ".fm").parse_str(Path::new(relative_path), input)
    }

    #[test]
    fn test_parse_minimal_item() -> Result<()> {
        let item = parse("items/notes.md.fm", "---\ntitle: Notes\n---\n# Hello\n")?;
        assert_eq!("Notes", item.title);
        assert!(item.tags.is_empty());
        assert_eq!(None, item.description);
        assert_eq!(Target::Path(PathBuf::from("items/notes.md")), item.target);
        assert_eq!("/items/notes.md", item.href);
        assert_eq!(vec![PathBuf::from("/site/src/items/notes.md.fm")], item.files);
        assert_eq!(vec![Step::Noop], item.pipeline.steps);
        assert!(item.indexed);
        assert_eq!("# Hello\n", item.payload);
        assert_eq!(PathBuf::from("items/notes.md.fm"), item.location);
        Ok(())
    }

    #[test]
    fn test_parse_full_item() -> Result<()> {
        let item = parse(
            "items/sets/index.fm",
            "---\n\
             title: Sets\n\
             tags: [math, school, math]\n\
             abstract: Notes on sets\n\
             target: ../sets.html\n\
             files: [sets.tex, refs.bib]\n\
             build: markdown -> write\n\
             indexed: false\n\
             ---\n",
        )?;
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        assert_eq!(vec!["math", "school"], tags);
        assert_eq!(Some(String::from("Notes on sets")), item.description);
        assert_eq!(Target::Path(PathBuf::from("items/sets.html")), item.target);
        assert_eq!("/items/sets.html", item.href);
        assert_eq!(
            vec![
                PathBuf::from("/site/src/items/sets/sets.tex"),
                PathBuf::from("/site/src/items/sets/refs.bib"),
            ],
            item.files
        );
        assert_eq!(vec![Step::Markdown, Step::Write], item.pipeline.steps);
        assert!(!item.indexed);
        assert_eq!("", item.payload);
        Ok(())
    }

    #[test]
    fn test_url_target_is_kept() -> Result<()> {
        let item = parse(
            "links/rust.fm",
            "---\ntitle: Rust\ntarget: https://www.rust-lang.org/\n---\n",
        )?;
        assert_eq!(
            Target::Url(Url::parse("https://www.rust-lang.org/").unwrap()),
            item.target
        );
        assert_eq!("https://www.rust-lang.org/", item.href);
        Ok(())
    }

    #[test]
    fn test_index_html_is_dropped_from_href() -> Result<()> {
        let item = parse("items/app/index.html.fm", "---\ntitle: App\n---\n")?;
        assert_eq!("/items/app/", item.href);
        Ok(())
    }

    #[test]
    fn test_null_tags_are_empty() -> Result<()> {
        let item = parse("a.fm", "---\ntitle: A\ntags:\n---\n")?;
        assert!(item.tags.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_fences() {
        assert!(matches!(
            parse("a.fm", "title: A\n"),
            Err(Error::FrontmatterMissingStartFence)
        ));
        assert!(matches!(
            parse("a.fm", "---\ntitle: A\n"),
            Err(Error::FrontmatterMissingEndFence)
        ));
    }

    #[test]
    fn test_empty_frontmatter() {
        assert!(matches!(
            parse("a.fm", "---\n---\nbody"),
            Err(Error::MissingMetadata)
        ));
    }

    #[test]
    fn test_reserved_and_unknown_keys() {
        assert!(matches!(
            parse("a.fm", "---\ntitle: A\npayload: hi\n---\n"),
            Err(Error::ReservedKey(key)) if key == "payload"
        ));
        assert!(matches!(
            parse("a.fm", "---\ntitle: A\nlayout: article\n---\n"),
            Err(Error::DeserializeYaml(_))
        ));
        assert!(matches!(
            parse("a.fm", "---\ntags: [a]\n---\n"),
            Err(Error::DeserializeYaml(_))
        ));
    }

    #[test]
    fn test_target_outside_site() {
        assert!(matches!(
            parse("a.fm", "---\ntitle: A\ntarget: ../../escape.html\n---\n"),
            Err(Error::TargetOutsideSite(_))
        ));
    }

    #[test]
    fn test_unknown_step() {
        assert!(matches!(
            parse("a.fm", "---\ntitle: A\nbuild: markdown -> frobnicate\n---\n"),
            Err(Error::Pipeline(_))
        ));
    }

    #[test]
    fn test_parse_items() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path();
        fs::create_dir_all(src.join("items/deep"))?;
        fs::write(src.join("items/deep/b.fm"), "---\ntitle: B\ntags: [x]\n---\n")?;
        fs::write(src.join("items/a.fm"), "---\ntitle: A\n---\n")?;
        fs::write(src.join("items/readme.md"), "not an item")?;

        let items = Parser::new(src, ".fm").parse_items()?;
        let locations: Vec<PathBuf> = items.iter().map(|i| i.location.clone()).collect();
        assert_eq!(
            vec![PathBuf::from("items/a.fm"), PathBuf::from("items/deep/b.fm")],
            locations
        );
        Ok(())
    }

    #[test]
    fn test_parse_errors_are_annotated() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("broken.fm"), "no frontmatter")?;
        match Parser::new(dir.path(), ".fm").parse_items() {
            Err(e @ Error::Annotated(..)) => {
                assert!(e.to_string().contains("broken.fm"));
                Ok(())
            }
            other => panic!("expected an annotated error, got {:?}", other.map(|_| ())),
        }
    }
}
