//! C2: Database Pipeline — streams an encrypted WeChat V4 database file
//! through the page codec and emits a standard SQLite file.

mod pipeline;

pub use pipeline::{
    decrypt_database, get_database_info, validate_key, DatabaseInfo, DbStats, DecryptOptions,
    OnPageProgress,
};
