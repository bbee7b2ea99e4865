use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, Result};
use crate::export::writer::ExportPaths;

/// Outcome of one rotation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub archives: usize,
    pub files: usize,
    pub remove_failures: usize,
}

/// Periodically zips finished exports out of the feed directories.
///
/// Every pass bundles each feed's `*.csv` files last modified before
/// `now - max_age` into `archives/{feed}_{YYYY-mm-dd_HH-MM-SS}.zip` and then
/// removes the CSVs. A file is only removed once the archive holding it
/// has been synced and renamed into place.
pub struct Archiver {
    sources: Vec<PathBuf>,
    archive_dir: PathBuf,
    max_age: TimeDelta,
    interval: Duration,
}

impl Archiver {
    pub fn new(paths: &ExportPaths, max_age: TimeDelta, interval: Duration) -> Self {
        Self {
            sources: vec![paths.pinnacle.clone(), paths.analyzer.clone()],
            archive_dir: paths.archives.clone(),
            max_age,
            interval,
        }
    }

    /// Archives immediately, then once per interval. Returns only on error.
    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(dir = %self.archive_dir.display(), every_secs = self.interval.as_secs(), "archiver started");

        loop {
            ticker.tick().await;
            self.archive().await?;
        }
    }

    pub async fn archive(&self) -> Result<ArchiveStats> {
        self.archive_at(Utc::now()).await
    }

    pub async fn archive_at(&self, now: DateTime<Utc>) -> Result<ArchiveStats> {
        let sources = self.sources.clone();
        let archive_dir = self.archive_dir.clone();
        let cutoff = now - self.max_age;
        tokio::task::spawn_blocking(move || rotate(&sources, &archive_dir, cutoff, now)).await?
    }
}

fn rotate(sources: &[PathBuf], archive_dir: &Path, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<ArchiveStats> {
    let stamp = now.format("%Y-%m-%d_%H-%M-%S");
    let mut stats = ArchiveStats::default();

    for source in sources {
        let feed = source.file_name().and_then(|n| n.to_str()).unwrap_or("exports");
        let files = exports_older_than(source, cutoff)?;
        if files.is_empty() {
            debug!(feed, %cutoff, "nothing old enough to archive");
            continue;
        }

        let archive = write_archive(archive_dir, &format!("{feed}_{stamp}"), &files)?;
        stats.archives += 1;
        stats.files += files.len();

        for file in &files {
            if let Err(e) = fs::remove_file(file) {
                warn!(path = %file.display(), error = %e, "archived export could not be removed");
                stats.remove_failures += 1;
            }
        }
        info!(feed, files = files.len(), path = %archive.display(), "exports archived");
    }
    Ok(stats)
}

/// Finished exports in `dir` last modified strictly before `cutoff`, sorted.
/// In-flight `.part` files never match.
fn exports_older_than(dir: &Path, cutoff: DateTime<Utc>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.extension().is_some_and(|x| x == "csv") {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified: DateTime<Utc> = meta.modified()?.into();
        if modified < cutoff {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Deflates `files` into `{dir}/{base}.zip`, or `{base}_{n}.zip` when that
/// name is taken. Built as `.zip.part` and renamed once complete.
fn write_archive(dir: &Path, base: &str, files: &[PathBuf]) -> Result<PathBuf> {
    let mut target = dir.join(format!("{base}.zip"));
    let mut n = 1;
    while target.exists() {
        target = dir.join(format!("{base}_{n}.zip"));
        n += 1;
    }
    let part = target.with_extension("zip.part");

    let written = File::create(&part).map_err(AppError::from).and_then(|file| {
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for path in files {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            zip.start_file(name, options)?;
            io::copy(&mut File::open(path)?, &mut zip)?;
            debug!(file = name, "added to archive");
        }
        let file = zip.finish()?;
        file.sync_all()?;
        fs::rename(&part, &target)?;
        Ok(())
    });
    if let Err(e) = written {
        if let Err(rm) = fs::remove_file(&part) {
            if rm.kind() != ErrorKind::NotFound {
                warn!(path = %part.display(), error = %rm, "could not remove partial archive");
            }
        }
        return Err(e);
    }
    Ok(target)
}
