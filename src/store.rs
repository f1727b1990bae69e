use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::Channel;
use crate::error::DownloaderError;

pub const IMAGE_ATTRIBUTES_FILE: &str = "image_gene_node_attributes.tsv";
pub const APMS_ATTRIBUTES_FILE: &str = "apms_gene_node_attributes.tsv";
pub const APMS_EDGELIST_FILE: &str = "apms_edgelist.tsv";

#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: Utf8PathBuf,
}

impl RunDirectory {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn channel_dir(&self, channel: Channel) -> Utf8PathBuf {
        self.root.join(channel.as_str())
    }

    pub fn image_attributes_path(&self) -> Utf8PathBuf {
        self.root.join(IMAGE_ATTRIBUTES_FILE)
    }

    pub fn apms_attributes_path(&self) -> Utf8PathBuf {
        self.root.join(APMS_ATTRIBUTES_FILE)
    }

    pub fn apms_edgelist_path(&self) -> Utf8PathBuf {
        self.root.join(APMS_EDGELIST_FILE)
    }

    pub fn errors_path(output: &Utf8Path) -> Utf8PathBuf {
        output.with_extension("errors")
    }

    pub fn task_start_path(&self, start_time: i64) -> Utf8PathBuf {
        self.root.join(format!("task_{start_time}_start.json"))
    }

    pub fn task_finish_path(&self, start_time: i64) -> Utf8PathBuf {
        self.root.join(format!("task_{start_time}_finish.json"))
    }

    /// Creates the root and the four channel directories. Must complete before
    /// any download worker starts.
    pub fn ensure_layout(&self) -> Result<(), DownloaderError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(format!("{}: {err}", self.root)))?;
        for channel in Channel::ALL {
            let dir = self.channel_dir(channel);
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| DownloaderError::Filesystem(format!("{dir}: {err}")))?;
        }
        Ok(())
    }

    pub fn copy_input(&self, source: &Utf8Path) -> Result<Utf8PathBuf, DownloaderError> {
        let name = source.file_name().ok_or_else(|| {
            DownloaderError::Filesystem(format!("input has no file name: {source}"))
        })?;
        let dest = self.root.join(name);
        if dest.as_path() == source {
            return Ok(dest);
        }
        Self::copy_file_atomic(source, &dest)?;
        Ok(dest)
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), DownloaderError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), DownloaderError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), DownloaderError> {
        let parent = dest
            .parent()
            .ok_or_else(|| DownloaderError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".cellmaps-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| DownloaderError::Filesystem(format!("{source}: {err}")))?;
        if dest.as_std_path().exists() {
            fs::remove_file(dest.as_std_path())
                .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        }
        temp.persist(dest.as_std_path())
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
