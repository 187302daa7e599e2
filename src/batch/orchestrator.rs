use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{error, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::db::{decrypt_database, DecryptOptions, OnPageProgress};
use crate::error::{CoreError, CoreResult};
use crate::key::MasterKey;

/// One candidate database file discovered under a scan root.
#[derive(Debug, Clone, Serialize)]
pub struct DbFileEntry {
    /// Forward-slash-separated path relative to the scan root.
    pub relative_path: String,
    pub size_bytes: u64,
}

/// A file the batch successfully decrypted.
#[derive(Debug, Clone, Serialize)]
pub struct FileSuccess {
    pub relative_path: String,
    pub bytes: u64,
    pub duration_seconds: f64,
}

/// A file the batch failed to decrypt. Failures never abort siblings.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub relative_path: String,
    pub error_kind: String,
    pub message: String,
}

/// Result of a `decrypt_batch` run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub scanned: Vec<DbFileEntry>,
    pub successes: Vec<FileSuccess>,
    pub failures: Vec<FileFailure>,
}

/// Per-page progress within one file of the batch.
pub trait OnFileProgress: Sync {
    fn on_file_progress(&self, relative_path: &str, current: u32, total: u32);
}

/// Fired once a file's decryption attempt (success or failure) completes.
pub trait OnFileDone: Sync {
    fn on_file_done(&self, relative_path: &str, success: bool);
}

/// Tunables for one batch job.
pub struct BatchOptions<'a> {
    /// `0` runs sequentially on the calling thread.
    pub workers: usize,
    pub skip_validation: bool,
    /// Scan and return the file list without decrypting anything.
    pub scan_only: bool,
    pub on_file_progress: Option<&'a (dyn OnFileProgress + 'a)>,
    pub on_file_done: Option<&'a (dyn OnFileDone + 'a)>,
}

impl<'a> Default for BatchOptions<'a> {
    fn default() -> Self {
        BatchOptions {
            workers: 0,
            skip_validation: false,
            scan_only: false,
            on_file_progress: None,
            on_file_done: None,
        }
    }
}

/// Recursively enumerate `.db` files under `root`, deterministically
/// ordered by lexicographic relative path.
pub fn scan(root: impl AsRef<Path>) -> CoreResult<Vec<DbFileEntry>> {
    let root = root.as_ref();
    let mut entries = Vec::new();

    for dir_entry in WalkDir::new(root).into_iter() {
        let dir_entry = dir_entry.map_err(|e| {
            CoreError::Io {
                path: root.to_path_buf(),
                source: e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk error")
                }),
            }
        })?;

        if !dir_entry.file_type().is_file() {
            continue;
        }
        let name = dir_entry.file_name().to_string_lossy();
        if !name.to_lowercase().ends_with(".db") {
            continue;
        }

        let relative = dir_entry
            .path()
            .strip_prefix(root)
            .unwrap_or(dir_entry.path());
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let size_bytes = dir_entry
            .metadata()
            .map_err(|e| CoreError::Io {
                path: dir_entry.path().to_path_buf(),
                source: e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "metadata error")
                }),
            })?
            .len();

        entries.push(DbFileEntry {
            relative_path,
            size_bytes,
        });
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

struct PageProgressAdapter<'a> {
    relative_path: &'a str,
    sink: &'a dyn OnFileProgress,
}

impl<'a> OnPageProgress for PageProgressAdapter<'a> {
    fn on_page(&self, current: u32, total: u32) {
        self.sink.on_file_progress(self.relative_path, current, total);
    }
}

fn decrypt_one(
    root: &Path,
    out_root: &Path,
    entry: &DbFileEntry,
    master_key: &MasterKey,
    options: &BatchOptions,
) -> Result<FileSuccess, FileFailure> {
    let in_path = root.join(&entry.relative_path);
    let out_path = out_root.join(&entry.relative_path);

    let started = Instant::now();
    let progress_adapter = options
        .on_file_progress
        .map(|sink| PageProgressAdapter {
            relative_path: entry.relative_path.as_str(),
            sink,
        });

    let decrypt_options = DecryptOptions {
        skip_validation: options.skip_validation,
        progress: progress_adapter
            .as_ref()
            .map(|p| p as &dyn OnPageProgress),
    };

    let result = decrypt_database(&in_path, &out_path, master_key, decrypt_options);
    let success = result.is_ok();
    if let Some(on_done) = options.on_file_done {
        on_done.on_file_done(&entry.relative_path, success);
    }

    match result {
        Ok(stats) => {
            info!("batch: {} decrypted ok", entry.relative_path);
            Ok(FileSuccess {
                relative_path: entry.relative_path.clone(),
                bytes: stats.bytes_written,
                duration_seconds: started.elapsed().as_secs_f64(),
            })
        }
        Err(e) => {
            warn!("batch: {} failed: {e}", entry.relative_path);
            Err(FileFailure {
                relative_path: entry.relative_path.clone(),
                error_kind: error_kind_name(&e),
                message: e.to_string(),
            })
        }
    }
}

fn error_kind_name(e: &CoreError) -> String {
    match e {
        CoreError::InvalidKey(_) => "InvalidKey",
        CoreError::MacMismatch { .. } => "MacMismatch",
        CoreError::CorruptInput { .. } => "CorruptInput",
        CoreError::CryptoFailure(_) => "CryptoFailure",
        CoreError::Io { .. } => "IoFailure",
        CoreError::UnsupportedVersion => "UnsupportedVersion",
        CoreError::BadPadding => "BadPadding",
    }
    .to_string()
}

/// Mirror `root`'s `.db` tree under `out_root`, decrypting every file
/// with `master_key`. `options.workers` bounds the worker pool; `0`
/// decrypts sequentially on the calling thread to keep fine-grained
/// per-page progress coherent.
pub fn decrypt_batch(
    root: impl AsRef<Path>,
    out_root: impl AsRef<Path>,
    master_key: &MasterKey,
    options: BatchOptions,
) -> CoreResult<BatchReport> {
    let root = root.as_ref().to_path_buf();
    let out_root = out_root.as_ref().to_path_buf();

    let scanned = scan(&root)?;
    if options.scan_only {
        return Ok(BatchReport {
            scanned,
            successes: Vec::new(),
            failures: Vec::new(),
        });
    }

    for entry in &scanned {
        if let Some(parent) = out_root.join(&entry.relative_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
    }

    let successes = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));

    if options.workers == 0 {
        for entry in &scanned {
            match decrypt_one(&root, &out_root, entry, master_key, &options) {
                Ok(s) => successes.lock().unwrap().push(s),
                Err(f) => failures.lock().unwrap().push(f),
            }
        }
    } else {
        let queue = Arc::new(Mutex::new(VecDeque::from(scanned.clone())));
        std::thread::scope(|scope| {
            for _ in 0..options.workers {
                let queue = Arc::clone(&queue);
                let successes = Arc::clone(&successes);
                let failures = Arc::clone(&failures);
                let root = &root;
                let out_root = &out_root;
                let options = &options;
                scope.spawn(move || loop {
                    let entry = {
                        let mut q = queue.lock().unwrap();
                        q.pop_front()
                    };
                    let Some(entry) = entry else { break };
                    match decrypt_one(root, out_root, &entry, master_key, options) {
                        Ok(s) => successes.lock().unwrap().push(s),
                        Err(f) => failures.lock().unwrap().push(f),
                    }
                });
            }
        });
    }

    let successes = Arc::try_unwrap(successes).unwrap().into_inner().unwrap();
    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();

    if !failures.is_empty() {
        error!("batch finished with {} failure(s)", failures.len());
    }

    Ok(BatchReport {
        scanned,
        successes,
        failures,
    })
}
