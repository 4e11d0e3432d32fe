//! Application resources
//!
//! [`Archive`] keeps the files of an application in memory, and
//! [`ArchiveLoader`] answers the engine's load requests for `this://app/`
//! URLs from it. Loads that cannot be answered on the engine thread are
//! completed from a worker with [`spawn_file_delivery`].

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread::JoinHandle;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::api;
use crate::error::Result;
use crate::notify::{CallbackHandler, LoadResult, ScnLoadData};
use crate::request::Request;

/// URL prefix served from the archive
pub const ARCHIVE_SCHEME: &str = "this://app/";

/// In-memory files keyed by `/`-separated relative path
#[derive(Debug, Default, Clone)]
pub struct Archive {
    files: HashMap<String, Vec<u8>>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file below `root`
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut archive = Self::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                archive.insert(&key, std::fs::read(&path)?);
            }
        }
        tracing::info!("Archive loaded {} file(s) from {}", archive.len(), root.display());
        Ok(archive)
    }

    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.trim_start_matches('/').to_string(), data);
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path.trim_start_matches('/')).map(Vec::as_slice)
    }

    /// File for an archive URL; `None` for other schemes or a missing file
    pub fn lookup(&self, uri: &str) -> Option<&[u8]> {
        archive_path(uri).and_then(|path| self.get(&path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Path part of an archive URL, percent-decoded to match file names
fn archive_path(uri: &str) -> Option<String> {
    if !uri.starts_with(ARCHIVE_SCHEME) {
        return None;
    }
    let url = Url::parse(uri).ok()?;
    let path = percent_decode_str(url.path()).decode_utf8().ok()?;
    Some(path.trim_start_matches('/').to_string())
}

/// Host callback serving archive URLs
#[derive(Debug, Clone)]
pub struct ArchiveLoader {
    archive: Rc<Archive>,
}

impl ArchiveLoader {
    pub fn new(archive: Archive) -> Self {
        Self { archive: Rc::new(archive) }
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Answer one `SC_LOAD_DATA`
    pub fn load(&self, scn: &mut ScnLoadData) -> LoadResult {
        let uri = scn.uri();
        let Some(path) = archive_path(&uri) else {
            return LoadResult::Ok;
        };
        let Some(data) = self.archive.get(&path) else {
            tracing::warn!("Archive miss: {}", uri);
            return LoadResult::Discard;
        };
        match api::api() {
            Ok(api) if api.data_ready(scn.hdr.hwnd, &uri, data) => {
                tracing::trace!("Served {} ({} bytes)", uri, data.len());
                LoadResult::Ok
            }
            Ok(_) => {
                tracing::warn!("Engine refused data for {}", uri);
                LoadResult::Discard
            }
            Err(e) => {
                tracing::warn!("Cannot serve {}: {}", uri, e);
                LoadResult::Discard
            }
        }
    }

    /// Callback record to pass to [`Window::set_callback`](crate::window::Window::set_callback)
    pub fn into_callback(self) -> CallbackHandler {
        let mut cb = CallbackHandler::new();
        cb.on_load_data = Some(Box::new(move |scn: &mut ScnLoadData| self.load(scn)));
        cb
    }
}

/// Read `path` on a worker thread and complete `request` with its contents
///
/// The request fails with 404 when the file does not exist and with 500 on
/// any other I/O error.
pub fn spawn_file_delivery(request: Request, path: impl Into<PathBuf>) -> JoinHandle<Result<()>> {
    let path = path.into();
    std::thread::spawn(move || match std::fs::read(&path) {
        Ok(data) => request.succeeded(200, &data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("{} not found", path.display());
            request.failed(404, &[])
        }
        Err(e) => {
            tracing::error!("Reading {} failed: {}", path.display(), e);
            request.failed(500, &[])
        }
    })
}
