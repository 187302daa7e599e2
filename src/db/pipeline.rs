use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::key::MasterKey;
use crate::page_codec::{
    decrypt_page, derive_subkeys, validate_first_page, PAGE_SIZE, SALT_SIZE,
};

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// How often `OnPageProgress::on_page` fires, in pages. Bounds callback
/// overhead on large databases.
const PROGRESS_STRIDE: u32 = 64;

/// Read-only metadata about an encrypted (or already-decrypted) database
/// file, obtainable without the master key.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub page_count: u64,
    pub page_size: usize,
    pub salt_hex: String,
    pub is_encrypted: bool,
}

/// Outcome of a single successful `decrypt_database` call.
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub pages_written: u64,
    pub bytes_written: u64,
}

/// Non-blocking progress sink invoked on the worker thread performing
/// the decryption. Implementers should not block inside `on_page`.
pub trait OnPageProgress {
    fn on_page(&self, current: u32, total: u32);
}

/// A progress sink that does nothing; used when no reporter is supplied.
pub struct NoProgress;
impl OnPageProgress for NoProgress {
    fn on_page(&self, _current: u32, _total: u32) {}
}

/// Options controlling a single `decrypt_database` call.
pub struct DecryptOptions<'a> {
    /// Skip the page-1 MAC validation before writing any output.
    /// Retained for parity with the source tool; a wrong key will then
    /// write garbage for page 1 and fail with `MacMismatch{2}` on the
    /// next page. Validation-on is the strong default.
    pub skip_validation: bool,
    pub progress: Option<&'a dyn OnPageProgress>,
}

impl<'a> Default for DecryptOptions<'a> {
    fn default() -> Self {
        DecryptOptions {
            skip_validation: false,
            progress: None,
        }
    }
}

fn open_and_check_size(path: &Path) -> CoreResult<(File, u64)> {
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| CoreError::io(path, e))?
        .len();
    if size == 0 {
        return Err(CoreError::CorruptInput {
            reason: "file is empty".to_string(),
        });
    }
    if size % PAGE_SIZE as u64 != 0 {
        return Err(CoreError::CorruptInput {
            reason: format!(
                "file size {size} is not a multiple of the page size ({PAGE_SIZE})"
            ),
        });
    }
    Ok((file, size))
}

fn read_page(file: &mut File, page_index: u64) -> CoreResult<[u8; PAGE_SIZE]> {
    let mut page = [0u8; PAGE_SIZE];
    file.seek(SeekFrom::Start(page_index * PAGE_SIZE as u64))
        .map_err(|e| CoreError::CryptoFailure(format!("seek failed: {e}")))?;
    file.read_exact(&mut page)
        .map_err(|e| CoreError::CryptoFailure(format!("short read: {e}")))?;
    Ok(page)
}

/// Pure read of database metadata; does not require the key.
/// `is_encrypted` is true iff page 1 does not begin with the literal
/// SQLite magic.
pub fn get_database_info(in_path: impl AsRef<Path>) -> CoreResult<DatabaseInfo> {
    let path = in_path.as_ref();
    let (mut file, size) = open_and_check_size(path)?;
    let page_count = size / PAGE_SIZE as u64;

    let mut first_page = [0u8; PAGE_SIZE];
    file.read_exact(&mut first_page)
        .map_err(|e| CoreError::io(path, e))?;

    let is_encrypted = &first_page[..16] != SQLITE_MAGIC;
    let salt_hex = hex::encode(&first_page[..SALT_SIZE]);

    Ok(DatabaseInfo {
        page_count,
        page_size: PAGE_SIZE,
        salt_hex,
        is_encrypted,
    })
}

/// Convenience wrapper over `validate_first_page`.
pub fn validate_key(in_path: impl AsRef<Path>, master_key: &MasterKey) -> CoreResult<bool> {
    let path = in_path.as_ref();
    let (mut file, _size) = open_and_check_size(path)?;
    let first_page = read_page(&mut file, 0)?;
    Ok(validate_first_page(&first_page, master_key))
}

/// Stream-decrypt an encrypted WeChat V4 database into a standard
/// SQLite file. On any error the partial output is removed and derived
/// subkeys are dropped (zeroizing on the way out).
pub fn decrypt_database(
    in_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    master_key: &MasterKey,
    options: DecryptOptions,
) -> CoreResult<DbStats> {
    let in_path = in_path.as_ref();
    let out_path = out_path.as_ref();

    let (mut in_file, size) = open_and_check_size(in_path)?;
    let page_count = (size / PAGE_SIZE as u64) as u32;

    let first_page = read_page(&mut in_file, 0)?;
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&first_page[..SALT_SIZE]);
    let subkeys = derive_subkeys(master_key, &salt);

    if !options.skip_validation && !validate_first_page(&first_page, master_key) {
        return Err(CoreError::InvalidKey(
            "page-1 MAC verification failed".to_string(),
        ));
    }

    info!(
        "decrypting {} ({} pages) -> {}",
        in_path.display(),
        page_count,
        out_path.display()
    );

    let run = (|| -> CoreResult<DbStats> {
        let mut out_file = File::create(out_path).map_err(|e| CoreError::io(out_path, e))?;

        let decrypted_first = decrypt_page(1, &first_page, &subkeys)?;
        out_file
            .write_all(SQLITE_MAGIC)
            .map_err(|e| CoreError::io(out_path, e))?;
        out_file
            .write_all(&decrypted_first.plaintext_body[SALT_SIZE..])
            .map_err(|e| CoreError::io(out_path, e))?;
        out_file
            .write_all(&decrypted_first.trailer)
            .map_err(|e| CoreError::io(out_path, e))?;

        let mut bytes_written = PAGE_SIZE as u64;
        for page_index in 2..=page_count {
            let page = read_page(&mut in_file, (page_index - 1) as u64)?;
            let decrypted = decrypt_page(page_index, &page, &subkeys)?;
            out_file
                .write_all(&decrypted.plaintext_body)
                .map_err(|e| CoreError::io(out_path, e))?;
            out_file
                .write_all(&decrypted.trailer)
                .map_err(|e| CoreError::io(out_path, e))?;
            bytes_written += PAGE_SIZE as u64;

            if let Some(progress) = options.progress {
                if page_index % PROGRESS_STRIDE == 0 || page_index == page_count {
                    progress.on_page(page_index, page_count);
                }
            }
            debug!("wrote page {page_index}/{page_count}");
        }

        Ok(DbStats {
            pages_written: page_count as u64,
            bytes_written,
        })
    })();

    match run {
        Ok(stats) => Ok(stats),
        Err(e) => {
            warn!("decryption of {} failed: {e}; removing partial output", in_path.display());
            let _ = fs::remove_file(out_path);
            Err(e)
        }
    }
}
