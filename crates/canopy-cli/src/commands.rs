//! CLI command implementations.

use canopy_core::{ChangeKind, FileChange, LogMessage, Severity, WatchRequest};
use canopy_server::{CanopyServer, ServerConfig};
use canopy_watcher::{WatchOutput, WatcherConfig, WatcherService};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Loads the watcher config, or the defaults when no file is given.
fn load_config(path: Option<&Path>) -> Result<WatcherConfig> {
    match path {
        Some(path) => Ok(WatcherConfig::load(path)?),
        None => Ok(WatcherConfig::default()),
    }
}

/// Turns command-line paths into absolute watch requests.
fn build_requests(
    paths: &[PathBuf],
    excludes: &[String],
    poll: Option<u64>,
    cwd: &Path,
) -> Vec<WatchRequest> {
    paths
        .iter()
        .map(|path| {
            let absolute = if path == Path::new(".") {
                cwd.to_path_buf()
            } else {
                cwd.join(path)
            };
            let request = WatchRequest::new(absolute).with_excludes(excludes.iter().cloned());
            match poll {
                Some(ms) => request.with_polling_interval(Duration::from_millis(ms)),
                None => request,
            }
        })
        .collect()
}

/// Routes panics anywhere in the process to the watcher's log stream.
fn forward_panics(service: WatcherService) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        service.report_unexpected_error(info.to_string());
        default_hook(info);
    }));
}

/// Watch folders and print every batch until Ctrl+C.
pub async fn watch(
    paths: &[PathBuf],
    excludes: Vec<String>,
    poll: Option<u64>,
    config: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let requests = build_requests(paths, &excludes, poll, &std::env::current_dir()?);

    let (service, mut outputs) = WatcherService::native(config);
    forward_panics(service.clone());
    service.set_verbose_logging(verbose);

    let summary = service.watch(requests).await;
    for path in &summary.started {
        println!("{} Watching {}", "✓".green(), path.display());
    }
    if summary.started.is_empty() {
        eprintln!("{} Nothing to watch", "⚠".yellow());
        return Ok(());
    }
    println!("  Press {} to stop", "Ctrl+C".cyan());

    loop {
        tokio::select! {
            output = outputs.recv() => match output {
                Some(WatchOutput::Changes(batch)) => print_batch(&batch),
                Some(WatchOutput::Log(message)) => print_log(&message),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let stopped = service.stop().await;
    println!("{} Stopped {} watcher(s)", "✓".green(), stopped);
    Ok(())
}

/// Serve the watcher over stdio until stdin closes.
pub async fn serve(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let server = CanopyServer::new(ServerConfig { watcher: config });
    forward_panics(server.service());

    info!("Serving on stdio");
    server.run_stdio().await?;
    Ok(())
}

fn print_batch(batch: &[FileChange]) {
    for change in batch {
        let marker = match change.kind {
            ChangeKind::Added => "+".green(),
            ChangeKind::Updated => "~".yellow(),
            ChangeKind::Deleted => "-".red(),
        };
        println!("{} {}", marker, change.path.display());
    }
}

fn print_log(message: &LogMessage) {
    match message.severity {
        Severity::Error => eprintln!("{} {}", "error:".red().bold(), message.text),
        Severity::Warn => eprintln!("{} {}", "⚠".yellow(), message.text),
        Severity::Debug | Severity::Trace => eprintln!("{}", message.text.dimmed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_build_requests_absolute() {
        let cwd = PathBuf::from("/work");
        let requests = build_requests(
            &[PathBuf::from("."), PathBuf::from("src"), PathBuf::from("/abs")],
            &["**/.git".to_string()],
            None,
            &cwd,
        );

        let paths: Vec<_> = requests.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/work"),
                PathBuf::from("/work/src"),
                PathBuf::from("/abs")
            ]
        );
        assert!(requests.iter().all(|r| r.excludes == vec!["**/.git".to_string()]));
    }

    #[test]
    fn test_build_requests_polling() {
        let requests = build_requests(&[PathBuf::from("/w")], &[], Some(250), Path::new("/"));
        assert_eq!(requests[0].polling_interval_ms, Some(250));
    }

    #[test]
    fn test_load_config() {
        assert_eq!(load_config(None).unwrap(), WatcherConfig::default());

        let dir = tempdir().unwrap();
        let path = dir.path().join("canopy.json");
        fs::write(&path, r#"{"verbose": true}"#).unwrap();
        assert!(load_config(Some(&path)).unwrap().verbose);

        assert!(load_config(Some(&dir.path().join("missing.json"))).is_err());
    }
}
