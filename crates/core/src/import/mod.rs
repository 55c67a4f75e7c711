pub mod jobs;

use std::fs::{self, File};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::domain::Photo;
use crate::error::Result;
use crate::imaging;
use crate::layout::Layout;
use jobs::JobStore;

/// Raster formats accepted from an archive, matched case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Most bytes reserved up front for one entry; the declared size is untrusted.
const MAX_PREALLOC: u64 = 64 << 20;

fn capacity_hint(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// An archive member that will be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub index: usize,
    /// Path inside the archive.
    pub name: String,
    /// Lowercased extension.
    pub extension: String,
}

impl ArchiveEntry {
    /// Last path segment, used as the photo's original name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name)
    }
}

/// Lowercased extension of an importable member, `None` for anything to skip:
/// directories, macOS resource forks, hidden files, unsupported types.
pub fn importable_extension(name: &str, is_dir: bool) -> Option<String> {
    if is_dir || name.ends_with('/') || name.starts_with("__MACOSX/") {
        return None;
    }
    let base = name.rsplit(['/', '\\']).next()?;
    if base.is_empty() || base.starts_with('.') {
        return None;
    }
    let (_, ext) = base.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// List importable members in archive order.
pub fn scan_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        let name = file.name().to_string();
        match importable_extension(&name, file.is_dir()) {
            Some(extension) => entries.push(ArchiveEntry {
                index,
                name,
                extension,
            }),
            None => debug!(entry = %name, "skipping archive entry"),
        }
    }
    Ok(entries)
}

/// Import knobs taken from [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    pub preview_width: u32,
    pub preview_quality: u8,
    pub yield_every: usize,
}

impl From<&Settings> for ImportOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            preview_width: settings.preview_width,
            preview_quality: settings.preview_quality,
            yield_every: settings.yield_every.max(1),
        }
    }
}

/// A running import. Progress is read from the job store, not from here.
#[derive(Debug)]
pub struct ImportHandle {
    match_id: String,
    total: usize,
    thread: JoinHandle<()>,
}

impl ImportHandle {
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Number of importable entries found in the archive.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the worker exits.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Copy `archive` into the temp area, count its entries and start a worker.
/// Failures before the worker starts are returned directly and leave no temp file.
pub(crate) fn start(
    layout: &Layout,
    job_store: Arc<dyn JobStore>,
    options: ImportOptions,
    match_id: &str,
    archive: &Path,
) -> Result<ImportHandle> {
    let temp = layout.temp_archive(match_id)?;
    fs::create_dir_all(layout.temp_dir())?;
    fs::copy(archive, &temp)?;

    let prepared = scan_archive(&temp).and_then(|entries| {
        job_store.create_job(match_id, entries.len())?;
        Ok(entries)
    });
    let entries = match prepared {
        Ok(entries) => entries,
        Err(e) => {
            remove_quietly(&temp);
            return Err(e);
        }
    };

    let total = entries.len();
    info!(match_id, total, archive = %archive.display(), "import started");
    let task = ImportTask {
        match_id: match_id.to_string(),
        archive: temp.clone(),
        layout: layout.clone(),
        options,
        jobs: Arc::clone(&job_store),
        entries,
    };

    let spawned = thread::Builder::new()
        .name(format!("import-{match_id}"))
        .spawn(move || task.run());
    match spawned {
        Ok(thread) => Ok(ImportHandle {
            match_id: match_id.to_string(),
            total,
            thread,
        }),
        Err(e) => {
            job_store.fail_job(match_id, &e.to_string());
            remove_quietly(&temp);
            Err(e.into())
        }
    }
}

pub(crate) struct ImportTask {
    match_id: String,
    archive: PathBuf,
    layout: Layout,
    options: ImportOptions,
    jobs: Arc<dyn JobStore>,
    entries: Vec<ArchiveEntry>,
}

/// Outcome counts of one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
}

impl ImportTask {
    /// Worker body. Always ends the job in a terminal state and removes the temp archive.
    pub(crate) fn run(self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute()));
        match outcome {
            Ok(Ok(summary)) => {
                self.jobs.complete_job(&self.match_id);
                info!(
                    match_id = %self.match_id,
                    imported = summary.imported,
                    failed = summary.failed,
                    "import completed"
                );
            }
            Ok(Err(e)) => {
                error!(match_id = %self.match_id, error = %e, "import failed");
                self.jobs.fail_job(&self.match_id, &e.to_string());
            }
            Err(_) => {
                error!(match_id = %self.match_id, "import worker panicked");
                self.jobs.fail_job(&self.match_id, "import worker panicked");
            }
        }
        remove_quietly(&self.archive);
    }

    fn execute(&self) -> Result<ImportSummary> {
        // The worker gets its own connection; WAL keeps readers unblocked
        let catalog = Catalog::open(&self.layout.catalog_path())?;
        let mut archive = ZipArchive::new(File::open(&self.archive)?)?;
        let mut summary = ImportSummary::default();

        for (n, entry) in self.entries.iter().enumerate() {
            match self.import_entry(&catalog, &mut archive, entry) {
                Ok(photo) => {
                    summary.imported += 1;
                    debug!(photo_id = %photo.id, entry = %entry.name, "imported");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(match_id = %self.match_id, entry = %entry.name, error = %e, "skipping entry");
                    self.jobs.record_failure(&self.match_id);
                }
            }
            self.jobs.update_progress(&self.match_id, n + 1);
            if (n + 1) % self.options.yield_every == 0 {
                thread::yield_now();
            }
        }
        Ok(summary)
    }

    fn import_entry(
        &self,
        catalog: &Catalog,
        archive: &mut ZipArchive<File>,
        entry: &ArchiveEntry,
    ) -> Result<Photo> {
        let id = uuid::Uuid::new_v4().to_string();
        let photo = Photo {
            original_path: self.layout.raw_path(&self.match_id, &id, &entry.extension)?,
            preview_path: self.layout.preview_path(&self.match_id, &id)?,
            original_name: entry.file_name().to_string(),
            match_id: self.match_id.clone(),
            id,
        };

        let stored = self.store_files(archive, entry, &photo).and_then(|()| catalog.insert_photo(&photo));
        if let Err(e) = stored {
            remove_quietly(&photo.original_path);
            remove_quietly(&photo.preview_path);
            return Err(e);
        }
        Ok(photo)
    }

    fn store_files(&self, archive: &mut ZipArchive<File>, entry: &ArchiveEntry, photo: &Photo) -> Result<()> {
        let mut file = archive.by_index(entry.index)?;
        let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut bytes)?;
        imaging::write_file(&photo.original_path, &bytes)?;
        imaging::write_preview(
            &photo.original_path,
            &photo.preview_path,
            self.options.preview_width,
            self.options.preview_quality,
        )
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove file");
        }
    }
}
