use super::{enforce_quota, KeyValueStore};
use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const ENTRY_EXTENSION: &str = "json";

/// One file per key under a directory. Keys are percent-encoded into file
/// names so listing the directory gives the original keys back.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    quota_bytes: Option<u64>,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(root: &Path, quota_bytes: Option<u64>) -> AppResult<Self> {
        fs::create_dir_all(root).map_err(|error| AppError::Io(error.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
            quota_bytes,
            write_lock: Mutex::new(()),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", encode_key(key), ENTRY_EXTENSION))
    }

    fn stored_bytes_except(&self, key: &str) -> AppResult<u64> {
        let mut total = 0u64;
        for (existing, path) in self.entries()? {
            if existing == key {
                continue;
            }
            let len = fs::metadata(&path)
                .map_err(|error| AppError::Io(error.to_string()))?
                .len();
            total += existing.len() as u64 + len;
        }
        Ok(total)
    }

    fn entries(&self) -> AppResult<Vec<(String, PathBuf)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|error| AppError::Io(error.to_string()))? {
            let entry = entry.map_err(|error| AppError::Io(error.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => entries.push((key, path)),
                None => {
                    tracing::warn!(path = %path.to_string_lossy(), "skipping file with undecodable key name");
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|error| AppError::Io(error.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("file store mutex poisoned".to_string()))?;
        if self.quota_bytes.is_some() {
            enforce_quota(self.quota_bytes, self.stored_bytes_except(key)?, key, value)?;
        }

        let path = self.entry_path(key);
        let staging = path.with_extension("tmp");
        fs::write(&staging, value).map_err(|error| AppError::Io(error.to_string()))?;
        fs::rename(&staging, &path).map_err(|error| AppError::Io(error.to_string()))
    }

    fn remove(&self, key: &str) -> AppResult<bool> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("file store mutex poisoned".to_string()))?;
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).map_err(|error| AppError::Io(error.to_string()))?;
        Ok(true)
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(key, _)| key).collect())
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = name.get(index + 1..index + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::{decode_key, encode_key, FileStore};
    use crate::store::KeyValueStore;

    #[test]
    fn keys_with_dots_and_slashes_stay_inside_root() {
        let encoded = encode_key("shelf/../tasks.v1");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('.'));
        assert_eq!(decode_key(&encoded).as_deref(), Some("shelf/../tasks.v1"));
        assert!(decode_key("bad%G1").is_none());
    }

    #[test]
    fn set_get_and_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path(), None).expect("open");
        store.set("shelf.tasks", "[]").expect("set");
        store.set("shelf.theme.dark", "false").expect("set");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write stray file");

        assert_eq!(store.get("shelf.tasks").expect("get").as_deref(), Some("[]"));
        assert_eq!(
            store.keys().expect("keys"),
            vec!["shelf.tasks".to_string(), "shelf.theme.dark".to_string()]
        );
        assert!(store.remove("shelf.tasks").expect("remove"));
        assert!(store.get("shelf.tasks").expect("get").is_none());
    }
}
