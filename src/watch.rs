//! Serves the output directory while rebuilding the site whenever something
//! in the project changes.

use crate::build::{build_site, Options};
use crate::config::Config;
use crate::util::path_in_eq_dir;
use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEvent};
use std::fs;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Builds the site, starts the configured server in the output directory,
/// and rebuilds incrementally on every batch of file-system events until the
/// watcher goes away. Failed builds are logged and don't stop serving.
pub fn serve(config: &Config, options: &Options) -> Result<()> {
    try_build_site(config, options);

    fs::create_dir_all(&config.output_directory).with_context(|| {
        format!(
            "Creating output directory `{}`",
            config.output_directory.display()
        )
    })?;
    let _server = Server::spawn(&config.serve_command, &config.output_directory)?;

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(config.debounce, tx)?;
    debouncer
        .watcher()
        .watch(&config.project_root, RecursiveMode::Recursive)
        .with_context(|| format!("Watching `{}`", config.project_root.display()))?;
    info!("watching '{}' for changes", config.project_root.display());

    let incremental = Options {
        from_scratch: false,
    };
    for result in rx {
        match result {
            Ok(events) => {
                if let Some(event) = events.iter().find(|e| triggers_rebuild(config, e)) {
                    info!("'{}' changed", event.path.display());
                    try_build_site(config, &incremental);
                }
            }
            Err(e) => warn!("file watcher error: {}", e),
        }
    }

    warn!("file watcher disconnected");
    Ok(())
}

/// Whether `event` should cause a rebuild. Changes to the output directory
/// are the build's own doing, and changes to the project directory itself
/// carry no information.
fn triggers_rebuild(config: &Config, event: &DebouncedEvent) -> bool {
    if path_in_eq_dir(&event.path, &config.output_directory) {
        debug!("ignoring '{}'", event.path.display());
        return false;
    }
    event.path != config.project_root
}

fn try_build_site(config: &Config, options: &Options) {
    match build_site(config, options) {
        Ok(summary) => info!(
            "site ready: {} items ({} built, {} unchanged)",
            summary.items, summary.built, summary.skipped
        ),
        Err(e) => error!("{}\n^^ error occurred while building the site ^^", e),
    }
}

/// A running server process, killed when dropped.
struct Server(Child);

impl Server {
    fn spawn(command: &str, dir: &Path) -> Result<Server> {
        info!("serving '{}' with `{}`", dir.display(), command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .spawn()
            .with_context(|| format!("Starting server `{}`", command))?;
        Ok(Server(child))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("stopping server (pid {})", self.0.id());
        if let Err(e) = self.0.kill() {
            warn!("stopping server: {}", e);
        }
        let _ = self.0.wait();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use notify_debouncer_mini::DebouncedEventKind;
    use std::path::PathBuf;

    fn event(path: PathBuf) -> DebouncedEvent {
        DebouncedEvent {
            path,
            kind: DebouncedEventKind::Any,
        }
    }

    #[test]
    fn test_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        fs::create_dir_all(&config.output_directory).unwrap();

        assert!(triggers_rebuild(
            &config,
            &event(config.source_directory.join("notes.fm"))
        ));
        assert!(triggers_rebuild(
            &config,
            &event(dir.path().join("rosebud.yaml"))
        ));
        assert!(!triggers_rebuild(
            &config,
            &event(config.output_directory.join("notes.html"))
        ));
        assert!(!triggers_rebuild(&config, &event(config.output_directory.clone())));
        assert!(!triggers_rebuild(&config, &event(dir.path().to_owned())));
    }

    #[test]
    fn test_server_is_killed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::spawn("sleep 30", dir.path()).unwrap();
        let pid = server.0.id();
        drop(server);
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }
}
