use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{BaitRecord, EdgeRecord, SampleRecord, UniqueAntibodyRecord};
use crate::download::{DownloadOrchestrator, DownloadReport, FetchPolicy, Fetcher, ImageTaskBuilder};
use crate::error::DownloaderError;
use crate::genequery::GeneLookupClient;
use crate::network::project_edges;
use crate::provenance::TaskMarkers;
use crate::resolve::{
    ApmsGeneNodeAttributeGenerator, GeneNodeAttributeGenerator, ImageGeneNodeAttributeGenerator,
};
use crate::store::RunDirectory;
use crate::tables::{
    self, APMS_ATTRIBUTE_HEADER, IMAGE_ATTRIBUTE_HEADER, read_baits, read_edges, read_samples,
    read_unique_antibodies,
};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outdir: String,
    pub image_attributes: usize,
    pub image_errors: usize,
    pub apms_attributes: usize,
    pub apms_errors: usize,
    pub edges_written: usize,
    pub edges_dropped: usize,
    pub downloads: DownloadReport,
}

struct InputTables {
    samples: Vec<SampleRecord>,
    unique: Option<Vec<UniqueAntibodyRecord>>,
    interactions: Option<(Vec<EdgeRecord>, Vec<BaitRecord>)>,
}

pub struct Runner<G: GeneLookupClient, F: Fetcher> {
    config: ResolvedConfig,
    genes: G,
    fetcher: F,
}

impl<G: GeneLookupClient, F: Fetcher> Runner<G, F> {
    pub fn new(config: ResolvedConfig, genes: G, fetcher: F) -> Self {
        Self {
            config,
            genes,
            fetcher,
        }
    }

    /// The finish marker is written on every exit path once the start marker exists.
    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunSummary, DownloaderError> {
        let dir = RunDirectory::new(self.config.outdir.clone());
        sink.event(ProgressEvent {
            message: format!("phase=Prepare; creating {}", dir.root()),
            elapsed: None,
        });
        dir.ensure_layout()?;

        let mut markers = TaskMarkers::new(!self.config.skip_logging);
        markers.write_start(&dir, &self.config)?;

        let result = self.run_phases(&dir, sink);
        let status = match &result {
            Ok(_) => 0,
            Err(err) => err.exit_code(),
        };
        if let Err(err) = markers.write_finish(&dir, status) {
            if result.is_ok() {
                return Err(err);
            }
            warn!(error = %err, "failed to write task finish marker");
        }
        result
    }

    fn read_inputs(
        &self,
        dir: &RunDirectory,
        sink: &dyn ProgressSink,
    ) -> Result<InputTables, DownloaderError> {
        sink.event(ProgressEvent {
            message: "phase=Prepare; reading input tables".to_string(),
            elapsed: None,
        });
        let samples = read_samples(&self.config.csv)?;
        let unique = self
            .config
            .unique
            .as_deref()
            .map(read_unique_antibodies)
            .transpose()?;
        let interactions = match &self.config.apms_edgelist {
            Some(edgelist) => {
                let edges = read_edges(edgelist)?;
                let baits = match &self.config.apms_baitlist {
                    Some(path) => read_baits(path)?,
                    None => Vec::new(),
                };
                Some((edges, baits))
            }
            None => None,
        };

        dir.copy_input(&self.config.csv)?;
        if let Some(path) = &self.config.unique {
            dir.copy_input(path)?;
        }
        Ok(InputTables {
            samples,
            unique,
            interactions,
        })
    }

    fn run_phases(
        &self,
        dir: &RunDirectory,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, DownloaderError> {
        let mut summary = RunSummary {
            outdir: dir.root().to_string(),
            ..RunSummary::default()
        };
        let inputs = self.read_inputs(dir, sink)?;

        if let Some((edges, baits)) = inputs.interactions {
            self.run_interactions(dir, edges, baits, sink, &mut summary)?;
        }

        let started = Instant::now();
        let generator =
            ImageGeneNodeAttributeGenerator::new(inputs.samples, inputs.unique, &self.genes);
        let resolution = generator.gene_node_attributes()?;
        let output = dir.image_attributes_path();
        tables::write_gene_node_attributes(&output, &IMAGE_ATTRIBUTE_HEADER, &resolution.attributes)?;
        let errors = resolution.errors();
        tables::write_errors(&RunDirectory::errors_path(&output), &errors)?;
        summary.image_attributes = resolution.attributes.len();
        summary.image_errors = errors.len();
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} image gene attributes, {} errors",
                summary.image_attributes, summary.image_errors
            ),
            elapsed: Some(started.elapsed()),
        });

        let tasks = ImageTaskBuilder::new(&self.config.image_url, &self.config.imgsuffix, dir.root())
            .build(&generator.filtered_samples());
        sink.event(ProgressEvent {
            message: format!("phase=Download; {} images", tasks.len()),
            elapsed: None,
        });
        let policy = if self.config.skip_existing {
            FetchPolicy::SkipExisting
        } else {
            FetchPolicy::Always
        };
        let started = Instant::now();
        summary.downloads = DownloadOrchestrator::new(&self.fetcher, self.config.poolsize, policy)
            .with_max_retries(self.config.max_retries)
            .download(tasks)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Download; fetched {}, skipped {}",
                summary.downloads.fetched, summary.downloads.skipped
            ),
            elapsed: Some(started.elapsed()),
        });

        info!(outdir = %dir.root(), "run complete");
        Ok(summary)
    }

    fn run_interactions(
        &self,
        dir: &RunDirectory,
        edges: Vec<EdgeRecord>,
        baits: Vec<BaitRecord>,
        sink: &dyn ProgressSink,
        summary: &mut RunSummary,
    ) -> Result<(), DownloaderError> {
        let started = Instant::now();
        let generator = ApmsGeneNodeAttributeGenerator::new(edges, baits, &self.genes);
        let resolution = generator.gene_node_attributes()?;
        let output = dir.apms_attributes_path();
        tables::write_gene_node_attributes(&output, &APMS_ATTRIBUTE_HEADER, &resolution.attributes)?;
        let errors = resolution.errors();
        tables::write_errors(&RunDirectory::errors_path(&output), &errors)?;
        summary.apms_attributes = resolution.attributes.len();
        summary.apms_errors = errors.len();

        let network = project_edges(generator.edges(), &resolution.attributes);
        let output = dir.apms_edgelist_path();
        tables::write_edgelist(&output, &network.edges)?;
        tables::write_errors(&RunDirectory::errors_path(&output), &network.errors)?;
        summary.edges_written = network.edges.len();
        summary.edges_dropped = network.errors.len();

        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} interaction gene attributes, {} edges",
                summary.apms_attributes, summary.edges_written
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(())
    }
}
