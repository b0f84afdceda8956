pub(crate) mod archive;    // Unpacking the file archive, gunzipping dumps
pub(crate) mod db_restore; // Replaying dumps into the local database

pub use archive::{decompress, extract_files};
pub use db_restore::{ensure_replace_allowed, reimport};
