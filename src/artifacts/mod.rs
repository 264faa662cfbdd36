pub mod download;
pub mod remove;

pub use download::{
    base_name, download_request_url, download_to, transfer_result, DownloadError,
    TransportSession, DEFAULT_MAX_READ_SIZE,
};
pub use remove::{remove_report, sidecar_paths, RemoveError, SIDECAR_SUFFIXES};

#[cfg(test)]
#[path = "../tests/artifacts_tests.rs"]
mod tests;
