use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::{debug, warn};

use crate::store::KeyValueStore;

/// One JSON file per key under a data directory.
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", escape_key(key)))
    }

    fn write_file(path: &Path, contents: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Check for leftover .bak/.tmp files from an interrupted multi-key commit.
    /// A .bak whose final file is missing is moved back into place; other
    /// leftovers are deleted. Returns true if any were found.
    pub fn check_interrupted_commit(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return false;
        };
        let mut found = false;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".json.tmp") {
                found = true;
                let _ = fs::remove_file(&path);
            } else if let Some(stem) = name.strip_suffix(".bak")
                && stem.ends_with(".json")
            {
                found = true;
                let final_path = self.base_dir.join(stem);
                if final_path.exists() {
                    let _ = fs::remove_file(&path);
                } else if let Err(e) = fs::rename(&path, &final_path) {
                    warn!(file = %path.display(), error = %e, "could not restore backup");
                } else {
                    warn!(file = %final_path.display(), "restored from backup");
                }
            }
        }
        if found {
            warn!(dir = %self.base_dir.display(), "cleaned up files from an interrupted write");
        }
        found
    }

    fn rollback(committed: &[(PathBuf, PathBuf, bool)]) {
        for (final_path, bak_path, had_original) in committed {
            if *had_original {
                let _ = fs::rename(bak_path, final_path);
            } else {
                let _ = fs::remove_file(final_path);
            }
        }
    }
}

impl KeyValueStore for JsonStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.file_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.file_path(key);
        let tmp_path = path.with_extension("json.tmp");
        Self::write_file(&tmp_path, value)?;
        fs::rename(&tmp_path, &path)?;
        debug!(key, "stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.file_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Two-phase write with best-effort .bak rollback.
    ///
    /// Stage phase: write every value to a .tmp file; on failure remove them.
    /// Commit phase: move each original to .bak, then .tmp to final. On failure
    /// restore the .bak files already moved. After success, delete .bak files.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut staged: Vec<PathBuf> = Vec::new();
        for (key, json) in entries {
            let tmp_path = self.file_path(key).with_extension("json.tmp");
            match Self::write_file(&tmp_path, json) {
                Ok(()) => staged.push(tmp_path),
                Err(e) => {
                    for tmp in &staged {
                        let _ = fs::remove_file(tmp);
                    }
                    let _ = fs::remove_file(&tmp_path);
                    bail!("Write failed during staging: {e}");
                }
            }
        }

        let mut committed: Vec<(PathBuf, PathBuf, bool)> = Vec::new();
        for (i, (key, _)) in entries.iter().enumerate() {
            let final_path = self.file_path(key);
            let bak_path = final_path.with_extension("json.bak");
            let tmp_path = &staged[i];
            let had_original = final_path.exists();

            if had_original && let Err(e) = fs::rename(&final_path, &bak_path) {
                Self::rollback(&committed);
                for tmp in &staged[i..] {
                    let _ = fs::remove_file(tmp);
                }
                bail!("Write failed during commit (backup): {e}");
            }

            if let Err(e) = fs::rename(tmp_path, &final_path) {
                if had_original {
                    let _ = fs::rename(&bak_path, &final_path);
                }
                Self::rollback(&committed);
                for tmp in &staged[i..] {
                    let _ = fs::remove_file(tmp);
                }
                bail!("Write failed during commit (rename): {e}");
            }

            committed.push((final_path, bak_path, had_original));
        }

        for (_, bak_path, had_original) in &committed {
            if *had_original {
                let _ = fs::remove_file(bak_path);
            }
        }
        Ok(())
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wordmaster")
}

/// Keys embed lesson ids, which are user supplied. Anything outside
/// `[A-Za-z0-9_-]` is percent-encoded so every key maps to one flat file name.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}
