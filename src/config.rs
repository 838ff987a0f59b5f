//! Loads the project configuration. A project is a directory containing a
//! `rosebud.yaml` file (searched for from the working directory upward); every
//! key in the file is optional and relative paths are resolved against the
//! project directory.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The name of the project file.
pub const PROJECT_FILE: &str = "rosebud.yaml";

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Project {
    source_directory: PathBuf,
    output_directory: PathBuf,
    item_extension: String,
    layouts_directory: PathBuf,
    template_extension: String,
    stylesheet_command: String,
    serve_command: String,
    debounce_ms: u64,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            source_directory: PathBuf::from("src"),
            output_directory: PathBuf::from("build"),
            item_extension: String::from(".fm"),
            layouts_directory: PathBuf::from("layouts"),
            template_extension: String::from(".tmpl"),
            stylesheet_command: String::from("sass --quiet --update .:."),
            serve_command: String::from("python3 -m http.server"),
            debounce_ms: 500,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The directory holding `rosebud.yaml` (or the working directory when
    /// there is none). Watched for changes by `serve`.
    pub project_root: PathBuf,

    /// The directory searched for items and cloned into the output
    /// directory.
    pub source_directory: PathBuf,

    /// The directory the site is built into.
    pub output_directory: PathBuf,

    /// Files whose names end with this are items (e.g. `.fm`).
    pub item_extension: String,

    /// The directory holding layout templates, relative to the source
    /// directory.
    pub layouts_directory: PathBuf,

    /// The file extension of layout templates.
    pub template_extension: String,

    /// Run with `sh -c` in the output directory after items are built. `None`
    /// disables the step.
    pub stylesheet_command: Option<String>,

    /// Run with `sh -c` in the output directory by `serve`.
    pub serve_command: String,

    /// How long `serve` waits for file-system events to settle.
    pub debounce: Duration,
}

impl Config {
    /// Searches `dir` and its ancestors for a project file. When none is
    /// found, `dir` is taken to be the project root and all defaults apply.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let mut current = Some(dir);
        while let Some(candidate) = current {
            let path = candidate.join(PROJECT_FILE);
            if path.exists() {
                return match Config::from_project_file(&path) {
                    Ok(config) => Ok(config),
                    Err(e) => Err(anyhow!("Loading configuration: {:?}", e)),
                };
            }
            current = candidate.parent();
        }
        Ok(Config::resolve(dir, Project::default()))
    }

    pub fn from_project_file(path: &Path) -> Result<Config> {
        use crate::util::open;
        use std::io::Read;
        let mut contents = String::new();
        open(path, "project")?.read_to_string(&mut contents)?;
        // an empty file holds no document at all
        let project: Project = match contents.trim().is_empty() {
            true => Project::default(),
            false => serde_yaml::from_str(&contents)?,
        };
        match path.parent() {
            None => Err(anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )),
            Some(project_root) => Ok(Config::resolve(project_root, project)),
        }
    }

    /// The default configuration for a project rooted at `project_root`.
    pub fn with_root(project_root: &Path) -> Config {
        Config::resolve(project_root, Project::default())
    }

    fn resolve(project_root: &Path, project: Project) -> Config {
        let source_directory = project_root.join(project.source_directory);
        Config {
            project_root: project_root.to_owned(),
            layouts_directory: source_directory.join(project.layouts_directory),
            source_directory,
            output_directory: project_root.join(project.output_directory),
            item_extension: project.item_extension,
            template_extension: project.template_extension,
            stylesheet_command: match project.stylesheet_command.trim() {
                "" => None,
                command => Some(command.to_owned()),
            },
            serve_command: project.serve_command,
            debounce: Duration::from_millis(project.debounce_ms),
        }
    }

    /// The path of the layout template named `name`.
    pub fn layout_path(&self, name: &str) -> PathBuf {
        self.layouts_directory
            .join(format!("{}{}", name, self.template_extension))
    }
}
