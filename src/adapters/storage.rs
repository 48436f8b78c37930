use crate::config::MediaConfig;
use crate::domain::ports::ImageStore;
use crate::utils::error::{PlacesError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Characters escaped inside one URL path segment. `%` is included so a
/// stored name like `red%20square.jpg` survives the decode on the way back.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Image store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    base_url: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.root.clone(), config.url.clone())
    }

    /// Blob names are `/`-separated relative paths without `.` or `..`.
    fn checked_name(name: &str) -> Result<&str> {
        let valid = !name.is_empty()
            && !name.contains('\\')
            && !name.contains('\0')
            && name
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

        if valid {
            Ok(name)
        } else {
            Err(PlacesError::InvalidValueError {
                field: "blob name".to_string(),
                value: name.to_string(),
                reason: "must be a relative path without '.' or '..' segments".to_string(),
            })
        }
    }
}

/// `a.jpg` -> `a_1.jpg`, `a_2.jpg`, ...
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }

    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };

    let file = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, attempt, ext),
        _ => format!("{}_{}", file, attempt),
    };

    match dir {
        Some(dir) => format!("{}/{}", dir, file),
        None => file,
    }
}

impl ImageStore for LocalImageStore {
    async fn store(&self, name: &str, data: &[u8]) -> Result<String> {
        let name = Self::checked_name(name)?;

        if let Some(parent) = self.root.join(name).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut attempt = 0;
        loop {
            let candidate = candidate_name(name, attempt);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root.join(&candidate))
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    tracing::debug!("Stored {} ({} bytes)", candidate, data.len());
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn read(&self, blob_ref: &str) -> Result<Vec<u8>> {
        let name = Self::checked_name(blob_ref)?;
        match tokio::fs::read(self.root.join(name)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PlacesError::not_found("Image file", blob_ref))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, blob_ref: &str) -> Result<()> {
        let name = Self::checked_name(blob_ref)?;
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, blob_ref: &str) -> String {
        let encoded = blob_ref
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}", self.base_url, encoded)
    }
}
