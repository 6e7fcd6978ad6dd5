//! Large-object upload configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where uploaded BLOB/CLOB and batch files live.
///
/// Handles sent by clients resolve to `<upload_root>/<username>/<handle>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Root directory of per-user upload folders.
    #[serde(default = "default_upload_root")]
    pub upload_root: PathBuf,

    /// Keep uploaded files after the statement completes.
    /// Only meant for diagnosing failed binds.
    #[serde(default)]
    pub keep_uploaded_files: bool,

    /// Decode HTML-escaped CLOB content before binding.
    #[serde(default)]
    pub html_decode_clobs: bool,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            keep_uploaded_files: false,
            html_decode_clobs: false,
        }
    }
}

fn default_upload_root() -> PathBuf {
    PathBuf::from("data/uploads")
}
