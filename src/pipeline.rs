//! Defines the [`Step`] registry and the [`Pipeline`] that applies steps to an
//! item. An item's `build` key names its pipeline, either as a chain of
//! argument-less step names (`markdown -> write`) or as a YAML list in which
//! steps that take arguments are single-key maps:
//!
//! ```yaml
//! build:
//!   - markdown
//!   - template: {layout: article, requires: [mathjax]}
//!   - write
//! ```
//!
//! Steps run in order over a [`Job`], which carries the item and the payload
//! as transformed so far.

use crate::config::Config;
use crate::item::{Item, Target};
use crate::util::normalize_relative;
use crate::value::mapping_value;
use gtmpl::{Context, Template};
use gtmpl_value::Value;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, warn};
use url::Url;

/// How an item's `build` key is written.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BuildSpec {
    /// Step names separated by `->`.
    Chain(String),

    /// A list of steps, each either a name or a map from name to arguments.
    Steps(Vec<Step>),
}

impl Default for BuildSpec {
    fn default() -> Self {
        BuildSpec::Chain(String::from("noop"))
    }
}

/// A single build step.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Does nothing.
    Noop,

    /// Converts the payload from markdown to HTML.
    Markdown,

    /// Renders the payload as a template.
    TemplateRaw,

    /// Renders the payload as a template, then wraps the result in a layout.
    Template(Layout),

    /// Writes the payload to the item's target.
    Write,

    /// Writes the payload to a path relative to the output directory.
    WriteTo(PathBuf),

    /// Runs a command with `sh -c` in the output directory.
    Shell(String),

    /// Compiles a LaTeX document.
    Latex(Latex),
}

/// Arguments for [`Step::Template`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Layout {
    /// The layout's name; the layout is read from
    /// `{layouts_directory}/{layout}{template_extension}`.
    pub layout: String,

    /// Features the page needs (e.g. `mathjax`), exposed to the layout as
    /// `item.requires`.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Extra values for the layout.
    #[serde(default)]
    pub context: serde_yaml::Mapping,
}

/// Arguments for [`Step::Latex`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Latex {
    /// The `.tex` file, relative to the item.
    pub file: PathBuf,

    /// Extra arguments for `pdflatex`.
    #[serde(default)]
    pub tex_args: String,

    /// Extra arguments for `bibtex`.
    #[serde(default)]
    pub bib_args: String,
}

impl Step {
    /// Resolves an argument-less step by name.
    pub fn lookup(name: &str) -> Result<Step> {
        match name {
            "noop" => Ok(Step::Noop),
            "markdown" => Ok(Step::Markdown),
            "template_raw" => Ok(Step::TemplateRaw),
            "write" => Ok(Step::Write),
            "template" | "write_to" | "shell" | "latex" => {
                Err(Error::MissingArguments(name.to_owned()))
            }
            _ => Err(Error::UnknownStep(name.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Noop => "noop",
            Step::Markdown => "markdown",
            Step::TemplateRaw => "template_raw",
            Step::Template(_) => "template",
            Step::Write => "write",
            Step::WriteTo(_) => "write_to",
            Step::Shell(_) => "shell",
            Step::Latex(_) => "latex",
        }
    }

    /// Applies the step to `job`.
    pub fn apply(&self, job: &mut Job, site: &Site) -> Result<()> {
        match self {
            Step::Noop => Ok(()),
            Step::Markdown => {
                job.payload = crate::markdown::to_html(&job.payload);
                Ok(())
            }
            Step::TemplateRaw => {
                job.payload = render(&job.payload, site.context.clone())?;
                Ok(())
            }
            Step::Template(layout) => {
                let content = render(&job.payload, site.context.clone())?;
                job.requires = layout.requires.clone();
                job.payload = apply_layout(layout, job, content, site)?;
                Ok(())
            }
            Step::Write => match &job.item.target {
                Target::Path(path) => write(&site.config.output_directory.join(path), &job.payload),
                Target::Url(url) => Err(Error::WriteToUrl(url.clone())),
            },
            Step::WriteTo(path) => {
                let path =
                    normalize_relative(path).ok_or_else(|| Error::OutsideSite(path.clone()))?;
                write(&site.config.output_directory.join(path), &job.payload)
            }
            Step::Shell(command) => {
                shell(command, &site.config.output_directory).map(|_| ())
            }
            Step::Latex(latex) => compile_latex(latex, job, site),
        }
    }
}

/// An ordered list of steps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pipeline {
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn from_spec(spec: BuildSpec) -> Result<Pipeline> {
        let steps = match spec {
            BuildSpec::Steps(steps) => steps,
            BuildSpec::Chain(chain) => chain
                .split("->")
                .map(|name| Step::lookup(name.trim()))
                .collect::<Result<Vec<Step>>>()?,
        };
        Ok(Pipeline { steps })
    }

    /// Runs every step over `item`'s payload, in order.
    pub fn run(&self, item: &Item, site: &Site) -> Result<()> {
        let mut job = Job {
            item,
            payload: item.payload.clone(),
            requires: Vec::new(),
        };
        for step in &self.steps {
            debug!(step = step.name(), "applying step");
            step.apply(&mut job, site)
                .map_err(|e| Error::Annotated(format!("step `{}`", step.name()), Box::new(e)))?;
        }
        Ok(())
    }
}

/// The state threaded through a pipeline.
pub struct Job<'a> {
    pub item: &'a Item,

    /// The payload as transformed by the steps so far.
    pub payload: String,

    /// Set by [`Step::Template`].
    pub requires: Vec<String>,
}

/// What every step can see of the site being built.
pub struct Site<'a> {
    pub config: &'a Config,

    /// The values every template is rendered with (see
    /// [`crate::value::site_context`]).
    pub context: &'a HashMap<String, Value>,
}

fn apply_layout(layout: &Layout, job: &Job, content: String, site: &Site) -> Result<String> {
    let path = site.config.layout_path(&layout.layout);
    let text = fs::read_to_string(&path).map_err(|err| Error::OpenLayout {
        path: path.clone(),
        err,
    })?;

    let mut item = match Value::from(job.item) {
        Value::Object(m) => m,
        _ => HashMap::new(),
    };
    item.insert("content".to_owned(), Value::String(content));
    item.insert(
        "requires".to_owned(),
        Value::Array(job.requires.iter().cloned().map(Value::String).collect()),
    );

    let mut context = site.context.clone();
    context.insert("item".to_owned(), Value::Object(item));
    context.extend(mapping_value(&layout.context));
    render(&text, context)
}

/// Renders `text` as a template with `context` as its data.
pub fn render(text: &str, context: HashMap<String, Value>) -> Result<String> {
    // gtmpl never returns from parsing an action that isn't closed
    check_actions_closed(text)?;
    let mut template = Template::default();
    template.parse(text).map_err(Error::Template)?;
    let context = Context::from(Value::Object(context)).map_err(Error::Template)?;
    let mut output: Vec<u8> = Vec::new();
    template
        .execute(&mut output, &context)
        .map_err(Error::Template)?;
    String::from_utf8(output).map_err(|e| Error::Template(e.to_string()))
}

/// Fails if some `{{` in `text` has no `}}` after it.
fn check_actions_closed(text: &str) -> Result<()> {
    let mut offset = 0;
    while let Some(open) = text[offset..].find("{{") {
        let start = offset + open;
        match text[start + 2..].find("}}") {
            Some(close) => offset = start + 2 + close + 2,
            None => {
                return Err(Error::Template(format!(
                    "template: line {}: unclosed action",
                    text[..start].matches('\n').count() + 1
                )))
            }
        }
    }
    Ok(())
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Runs `command` with `sh -c` in `dir`, returning its combined output.
pub fn shell(command: &str, dir: &Path) -> Result<String> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(dir);
    run(cmd, command)
}

/// Runs `cmd`, returning its combined output. A non-zero exit status is an
/// error carrying the output. `description` names the command in errors.
fn run(mut cmd: Command, description: &str) -> Result<String> {
    let output = cmd.stdin(Stdio::null()).output()?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.status.success() {
        Ok(text)
    } else {
        Err(Error::Command {
            command: description.to_owned(),
            status: output.status,
            output: text,
        })
    }
}

/// Only the part of LaTeX's chatter starting at the first error line (`!`).
fn latex_errors(output: &str) -> String {
    output
        .lines()
        .skip_while(|line| !line.starts_with('!'))
        .take(200)
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Runs `pdflatex`, then `bibtex`, then `pdflatex` three more times so that
/// references and tables of contents settle.
fn compile_latex(latex: &Latex, job: &Job, site: &Site) -> Result<()> {
    let item_directory = job.item.location.parent().unwrap_or_else(|| Path::new(""));
    let relative = normalize_relative(&item_directory.join(&latex.file))
        .ok_or_else(|| Error::OutsideSite(latex.file.clone()))?;
    let tex_path = site.config.output_directory.join(&relative);
    let dir = tex_path
        .parent()
        .unwrap_or(&site.config.output_directory)
        .to_owned();
    let (file_name, stem) = match (tex_path.file_name(), tex_path.file_stem()) {
        (Some(file_name), Some(stem)) => (file_name.to_owned(), stem.to_owned()),
        _ => return Err(Error::OutsideSite(latex.file.clone())),
    };

    let pdflatex = || -> Result<()> {
        let mut cmd = Command::new("pdflatex");
        cmd.args(latex.tex_args.split_whitespace())
            .arg("-halt-on-error")
            .arg(&file_name)
            .current_dir(&dir);
        match run(cmd, "pdflatex") {
            Err(Error::Command {
                command,
                status,
                output,
            }) => Err(Error::Command {
                command: format!("{} {}", command, relative.display()),
                status,
                output: latex_errors(&output),
            }),
            result => result.map(|_| ()),
        }
    };

    pdflatex()?;

    let mut bibtex = Command::new("bibtex");
    bibtex
        .arg("-terse")
        .args(latex.bib_args.split_whitespace())
        .arg(&stem)
        .current_dir(&dir);
    // documents without citations make bibtex fail; that's not fatal
    if let Err(e) = run(bibtex, "bibtex") {
        warn!("{}", e);
    }

    for _ in 0..3 {
        pdflatex()?;
    }
    Ok(())
}

/// The result of a fallible build step.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error resolving or running a build step.
#[derive(Debug)]
pub enum Error {
    /// Returned when a step name isn't in the registry.
    UnknownStep(String),

    /// Returned when a step that needs arguments appears in a chain string.
    MissingArguments(String),

    /// Returned when a template fails to parse or execute.
    Template(String),

    /// Returned when a layout file can't be read.
    OpenLayout { path: PathBuf, err: io::Error },

    /// Returned when `write` is used on an item whose target is a URL.
    WriteToUrl(Url),

    /// Returned when a step's path leads outside of the output directory.
    OutsideSite(PathBuf),

    /// Returned when an external command exits unsuccessfully.
    Command {
        command: String,
        status: ExitStatus,
        output: String,
    },

    /// Returned for other I/O errors.
    Io(io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownStep(name) => write!(f, "Unknown build step `{}`", name),
            Error::MissingArguments(name) => write!(
                f,
                "Build step `{}` takes arguments; use the list form of `build`",
                name
            ),
            Error::Template(err) => err.fmt(f),
            Error::OpenLayout { path, err } => {
                write!(f, "Opening layout file '{}': {}", path.display(), err)
            }
            Error::WriteToUrl(url) => {
                write!(f, "Can't write to the URL target '{}'", url)
            }
            Error::OutsideSite(path) => {
                write!(f, "Path '{}' is outside of the site", path.display())
            }
            Error::Command {
                command,
                status,
                output,
            } => {
                write!(f, "Command `{}` failed ({})", command, status)?;
                if !output.is_empty() {
                    write!(f, ":\n{}", output)?;
                }
                Ok(())
            }
            Error::Io(err) => err.fmt(f),
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
            Error::OpenLayout { path: _, err } => Some(err),
            Error::Io(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
