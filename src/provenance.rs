use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::error::DownloaderError;
use crate::store::RunDirectory;

pub const TOOL_NAME: &str = "cellmaps-downloader";

#[derive(Debug, Clone, Serialize)]
pub struct TaskStart {
    pub start_time: i64,
    pub tool: String,
    pub version: String,
    pub outdir: String,
    pub inputs: ResolvedConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFinish {
    pub end_time: i64,
    pub elapsed_seconds: f64,
    pub status: u8,
}

#[derive(Debug)]
pub struct TaskMarkers {
    start_time: i64,
    started: Instant,
    enabled: bool,
    start_written: bool,
}

impl TaskMarkers {
    pub fn new(enabled: bool) -> Self {
        Self {
            start_time: Utc::now().timestamp(),
            started: Instant::now(),
            enabled,
            start_written: false,
        }
    }

    pub fn write_start(
        &mut self,
        dir: &RunDirectory,
        config: &ResolvedConfig,
    ) -> Result<(), DownloaderError> {
        if !self.enabled {
            return Ok(());
        }
        let marker = TaskStart {
            start_time: self.start_time,
            tool: TOOL_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            outdir: dir.root().to_string(),
            inputs: config.clone(),
        };
        let path = dir.task_start_path(self.start_time);
        RunDirectory::write_json(&path, &marker)?;
        debug!(path = %path, "task start marker written");
        self.start_written = true;
        Ok(())
    }

    pub fn write_finish(&self, dir: &RunDirectory, status: u8) -> Result<(), DownloaderError> {
        if !self.enabled || !self.start_written {
            return Ok(());
        }
        let marker = TaskFinish {
            end_time: Utc::now().timestamp(),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            status,
        };
        let path = dir.task_finish_path(self.start_time);
        RunDirectory::write_json(&path, &marker)?;
        debug!(path = %path, status, "task finish marker written");
        Ok(())
    }
}
