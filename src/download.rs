use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Channel, SampleRecord};
use crate::error::DownloaderError;

pub const DEFAULT_MAX_RETRIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub source_url: String,
    pub destination: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub status: Option<u16>,
    pub message: String,
    pub task: DownloadTask,
}

impl DownloadFailure {
    fn transport(task: &DownloadTask, message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            task: task.clone(),
        }
    }

    pub fn status_group(&self) -> String {
        match self.status {
            Some(status) => status.to_string(),
            None => "transport".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageTaskBuilder {
    base_url: String,
    suffix: String,
    output_dir: Utf8PathBuf,
}

impl ImageTaskBuilder {
    pub fn new(base_url: &str, suffix: &str, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            suffix: suffix.to_string(),
            output_dir: output_dir.into(),
        }
    }

    pub fn task(&self, sample: &SampleRecord, channel: Channel) -> DownloadTask {
        let file_name = format!("{}{}{}", sample.image_stem(), channel, self.suffix);
        DownloadTask {
            source_url: format!(
                "{}/{}/{}",
                self.base_url,
                sample.antibody.url_component(),
                file_name
            ),
            destination: self.output_dir.join(channel.as_str()).join(file_name),
        }
    }

    pub fn build(&self, samples: &[SampleRecord]) -> Vec<DownloadTask> {
        samples
            .iter()
            .flat_map(|sample| Channel::ALL.iter().map(move |channel| self.task(sample, *channel)))
            .collect()
    }
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, task: &DownloadTask) -> Result<(), DownloadFailure>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, task: &DownloadTask) -> Result<(), DownloadFailure> {
        (**self).fetch(task)
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, DownloaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cellmaps-downloader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DownloaderError::DownloadHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| DownloaderError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn write_response_to_file(
        mut response: reqwest::blocking::Response,
        task: &DownloadTask,
    ) -> Result<(), DownloadFailure> {
        let parent = task
            .destination
            .parent()
            .ok_or_else(|| DownloadFailure::transport(task, "invalid destination path"))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".cellmaps-dl")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| DownloadFailure::transport(task, err.to_string()))?;
        io::copy(&mut response, &mut temp)
            .map_err(|err| DownloadFailure::transport(task, err.to_string()))?;
        if task.destination.as_std_path().exists() {
            fs::remove_file(task.destination.as_std_path())
                .map_err(|err| DownloadFailure::transport(task, err.to_string()))?;
        }
        temp.persist(task.destination.as_std_path())
            .map_err(|err| DownloadFailure::transport(task, err.to_string()))?;
        Ok(())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, task: &DownloadTask) -> Result<(), DownloadFailure> {
        let response = self
            .client
            .get(&task.source_url)
            .send()
            .map_err(|err| DownloadFailure::transport(task, err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "image request failed".to_string());
            return Err(DownloadFailure {
                status: Some(status),
                message,
                task: task.clone(),
            });
        }
        Self::write_response_to_file(response, task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    Always,
    SkipExisting,
}

pub fn already_present(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Fetched,
    Skipped,
}

#[derive(Debug, Default)]
struct PassResult {
    fetched: usize,
    skipped: usize,
    failures: Vec<DownloadFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub tasks: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub retries_used: usize,
}

/// Runs download tasks on a fixed pool of worker threads and retries the failed
/// subset, pass after pass, until nothing fails or the retry ceiling is hit.
pub struct DownloadOrchestrator<F: Fetcher> {
    fetcher: F,
    pool_size: usize,
    policy: FetchPolicy,
    max_retries: usize,
}

impl<F: Fetcher> DownloadOrchestrator<F> {
    pub fn new(fetcher: F, pool_size: usize, policy: FetchPolicy) -> Self {
        Self {
            fetcher,
            pool_size: pool_size.max(1),
            policy,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn download(&self, tasks: Vec<DownloadTask>) -> Result<DownloadReport, DownloaderError> {
        let mut report = DownloadReport {
            tasks: tasks.len(),
            ..DownloadReport::default()
        };
        info!(tasks = tasks.len(), workers = self.pool_size, "starting image downloads");
        let mut pass = self.run_pass(tasks);
        report.fetched += pass.fetched;
        report.skipped += pass.skipped;

        while !pass.failures.is_empty() && report.retries_used < self.max_retries {
            report.retries_used += 1;
            log_failures(&pass.failures, report.retries_used, self.max_retries);
            let retry = std::mem::take(&mut pass.failures)
                .into_iter()
                .map(|failure| failure.task)
                .collect();
            pass = self.run_pass(retry);
            report.fetched += pass.fetched;
            report.skipped += pass.skipped;
        }

        if !pass.failures.is_empty() {
            for failure in &pass.failures {
                warn!(
                    url = %failure.task.source_url,
                    status = %failure.status_group(),
                    "download failed permanently"
                );
            }
            return Err(DownloaderError::DownloadsExhausted {
                retries: report.retries_used,
                failures: pass.failures,
            });
        }
        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            retries = report.retries_used,
            "image downloads complete"
        );
        Ok(report)
    }

    fn execute(&self, task: &DownloadTask) -> Result<TaskOutcome, DownloadFailure> {
        if self.policy == FetchPolicy::SkipExisting && already_present(&task.destination) {
            debug!(path = %task.destination, "already present, skipping");
            return Ok(TaskOutcome::Skipped);
        }
        self.fetcher.fetch(task)?;
        Ok(TaskOutcome::Fetched)
    }

    fn run_pass(&self, tasks: Vec<DownloadTask>) -> PassResult {
        let mut pass = PassResult::default();
        if tasks.is_empty() {
            return pass;
        }
        let workers = self.pool_size.min(tasks.len());
        let queue = Mutex::new(VecDeque::from(tasks));
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..workers {
                let queue = &queue;
                let tx = tx.clone();
                scope.spawn(move || {
                    loop {
                        let task = {
                            let mut guard = match queue.lock() {
                                Ok(guard) => guard,
                                Err(_) => return,
                            };
                            guard.pop_front()
                        };
                        let Some(task) = task else {
                            break;
                        };
                        if tx.send(self.execute(&task)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for outcome in rx {
                match outcome {
                    Ok(TaskOutcome::Fetched) => pass.fetched += 1,
                    Ok(TaskOutcome::Skipped) => pass.skipped += 1,
                    Err(failure) => pass.failures.push(failure),
                }
            }
        });
        pass
    }
}

fn log_failures(failures: &[DownloadFailure], retry: usize, max_retries: usize) {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for failure in failures {
        *by_status.entry(failure.status_group()).or_default() += 1;
    }
    let summary = by_status
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    warn!(
        failed = failures.len(),
        retry,
        max_retries,
        "retrying failed downloads ({summary})"
    );
}
