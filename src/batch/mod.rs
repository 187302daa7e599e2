//! C4: Batch Orchestrator — enumerates candidate database files and
//! dispatches decryption work across a bounded worker pool.

mod orchestrator;

pub use orchestrator::{
    decrypt_batch, scan, BatchOptions, BatchReport, DbFileEntry, FileFailure, FileSuccess,
    OnFileDone, OnFileProgress,
};
