use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::info;

use crate::domain::{
    AttributeSource, BaitRecord, EdgeRecord, GeneNodeAttribute, SampleRecord,
    UniqueAntibodyRecord,
};
use crate::error::DownloaderError;
use crate::genequery::{GeneLookupClient, GeneQueryRequest, GeneQueryResult, SCOPE_ENSEMBL_GENE};
use crate::splitter::{AmbiguityMap, IdentifierSet, add_identifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionIssue {
    MissingSymbol {
        query: String,
    },
    MissingEnsembl {
        query: String,
        symbol: String,
    },
    UnattributedGene {
        query: String,
        symbol: String,
        candidates: Vec<String>,
    },
    DuplicateQuery {
        query: String,
    },
}

impl fmt::Display for ResolutionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionIssue::MissingSymbol { query } => {
                write!(f, "Skipping {query}: no symbol in query result")
            }
            ResolutionIssue::MissingEnsembl { query, symbol } => {
                write!(f, "Skipping {query} ({symbol}): no ensembl gene in query result")
            }
            ResolutionIssue::UnattributedGene {
                query,
                symbol,
                candidates,
            } => write!(
                f,
                "Unable to attribute {query} ({symbol}): none of [{}] matches an antibody or image",
                candidates.join(", ")
            ),
            ResolutionIssue::DuplicateQuery { query } => {
                write!(f, "Skipping duplicate query result for {query}")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub attributes: BTreeMap<String, GeneNodeAttribute>,
    pub issues: Vec<ResolutionIssue>,
}

impl Resolution {
    pub fn errors(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

pub trait GeneNodeAttributeGenerator {
    fn gene_node_attributes(&self) -> Result<Resolution, DownloaderError>;
}

fn usable_result<'a>(
    result: &'a GeneQueryResult,
    seen: &BTreeMap<String, GeneNodeAttribute>,
    issues: &mut Vec<ResolutionIssue>,
) -> Option<(&'a str, &'a [String])> {
    if seen.contains_key(&result.query_id) {
        issues.push(ResolutionIssue::DuplicateQuery {
            query: result.query_id.clone(),
        });
        return None;
    }
    let Some(symbol) = result.symbol.as_deref() else {
        issues.push(ResolutionIssue::MissingSymbol {
            query: result.query_id.clone(),
        });
        return None;
    };
    match result.ensembl_gene_ids.as_deref() {
        Some(ids) if !ids.is_empty() => Some((symbol, ids)),
        _ => {
            issues.push(ResolutionIssue::MissingEnsembl {
                query: result.query_id.clone(),
                symbol: symbol.to_string(),
            });
            None
        }
    }
}

#[derive(Debug, Default)]
struct GeneSampleMaps {
    antibodies: BTreeMap<String, BTreeSet<String>>,
    filenames: BTreeMap<String, BTreeSet<String>>,
}

pub struct ImageGeneNodeAttributeGenerator<G: GeneLookupClient> {
    samples: Vec<SampleRecord>,
    unique: Option<Vec<UniqueAntibodyRecord>>,
    genes: G,
}

impl<G: GeneLookupClient> ImageGeneNodeAttributeGenerator<G> {
    pub fn new(
        samples: Vec<SampleRecord>,
        unique: Option<Vec<UniqueAntibodyRecord>>,
        genes: G,
    ) -> Self {
        Self {
            samples,
            unique,
            genes,
        }
    }

    pub fn filtered_samples(&self) -> Vec<SampleRecord> {
        let Some(unique) = &self.unique else {
            return self.samples.clone();
        };
        let allowed: BTreeSet<&str> = unique.iter().map(|row| row.antibody.as_str()).collect();
        self.samples
            .iter()
            .filter(|sample| allowed.contains(sample.antibody.as_str()))
            .cloned()
            .collect()
    }

    fn gene_maps(&self, samples: &[SampleRecord]) -> GeneSampleMaps {
        let mut maps = GeneSampleMaps::default();
        let mut scratch = IdentifierSet::new();
        for sample in samples {
            let stem = sample.image_stem();
            for gene in add_identifiers(&mut scratch, None, sample.ensembl_ids.as_deref()) {
                maps.antibodies
                    .entry(gene.clone())
                    .or_default()
                    .insert(sample.antibody.to_string());
                maps.filenames.entry(gene).or_default().insert(stem.clone());
            }
        }
        maps
    }

    fn query_universe(&self) -> (IdentifierSet, AmbiguityMap) {
        let mut ensembl_ids = IdentifierSet::new();
        let mut names = IdentifierSet::new();
        let mut ambiguous = AmbiguityMap::new();
        for sample in &self.samples {
            add_identifiers(&mut ensembl_ids, None, sample.ensembl_ids.as_deref());
            add_identifiers(&mut names, Some(&mut ambiguous), sample.gene_names.as_deref());
        }
        (ensembl_ids, ambiguous)
    }
}

impl<G: GeneLookupClient> GeneNodeAttributeGenerator for ImageGeneNodeAttributeGenerator<G> {
    fn gene_node_attributes(&self) -> Result<Resolution, DownloaderError> {
        let filtered = self.filtered_samples();
        let maps = self.gene_maps(&filtered);
        let (universe, ambiguous) = self.query_universe();

        let request = GeneQueryRequest::symbols_and_ensembl(
            universe.into_iter().collect(),
            Some(SCOPE_ENSEMBL_GENE),
        );
        let results = self.genes.query_many(&request)?;

        let mut resolution = Resolution::default();
        for result in &results {
            let Some((symbol, ensembl_ids)) =
                usable_result(result, &resolution.attributes, &mut resolution.issues)
            else {
                continue;
            };
            let anchor = if maps.antibodies.contains_key(&result.query_id) {
                Some(&result.query_id)
            } else {
                ensembl_ids
                    .iter()
                    .find(|id| maps.antibodies.contains_key(id.as_str()))
            };
            let Some(anchor) = anchor else {
                resolution.issues.push(ResolutionIssue::UnattributedGene {
                    query: result.query_id.clone(),
                    symbol: symbol.to_string(),
                    candidates: ensembl_ids.to_vec(),
                });
                continue;
            };
            let attribute = GeneNodeAttribute {
                name: symbol.to_string(),
                represents: GeneNodeAttribute::represents_from(ensembl_ids),
                ambiguous: ambiguous.get(symbol).cloned().unwrap_or_default(),
                source: AttributeSource::Image {
                    antibody: maps.antibodies.get(anchor).cloned().unwrap_or_default(),
                    filename: maps.filenames.get(anchor).cloned().unwrap_or_default(),
                },
            };
            resolution
                .attributes
                .insert(result.query_id.clone(), attribute);
        }

        info!(
            samples = self.samples.len(),
            allowed = filtered.len(),
            queried = request.queries.len(),
            resolved = resolution.attributes.len(),
            errors = resolution.issues.len(),
            "image gene attributes resolved"
        );
        Ok(resolution)
    }
}

pub struct ApmsGeneNodeAttributeGenerator<G: GeneLookupClient> {
    edges: Vec<EdgeRecord>,
    baits: Vec<BaitRecord>,
    genes: G,
}

impl<G: GeneLookupClient> ApmsGeneNodeAttributeGenerator<G> {
    pub fn new(edges: Vec<EdgeRecord>, baits: Vec<BaitRecord>, genes: G) -> Self {
        Self {
            edges,
            baits,
            genes,
        }
    }

    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    fn unique_gene_ids(&self) -> (IdentifierSet, AmbiguityMap) {
        let mut gene_ids = IdentifierSet::new();
        let mut ambiguous = AmbiguityMap::new();
        for edge in &self.edges {
            add_identifiers(&mut gene_ids, Some(&mut ambiguous), Some(&edge.gene_id_1));
            add_identifiers(&mut gene_ids, Some(&mut ambiguous), Some(&edge.gene_id_2));
        }
        (gene_ids, ambiguous)
    }

    fn bait_ids(&self) -> BTreeSet<&str> {
        self.baits.iter().map(|bait| bait.gene_id.trim()).collect()
    }
}

impl<G: GeneLookupClient> GeneNodeAttributeGenerator for ApmsGeneNodeAttributeGenerator<G> {
    fn gene_node_attributes(&self) -> Result<Resolution, DownloaderError> {
        let (gene_ids, ambiguous) = self.unique_gene_ids();
        let request = GeneQueryRequest::symbols_and_ensembl(gene_ids.into_iter().collect(), None);
        let results = self.genes.query_many(&request)?;
        let baits = self.bait_ids();

        let mut resolution = Resolution::default();
        for result in &results {
            let Some((symbol, ensembl_ids)) =
                usable_result(result, &resolution.attributes, &mut resolution.issues)
            else {
                continue;
            };
            let attribute = GeneNodeAttribute {
                name: symbol.to_string(),
                represents: GeneNodeAttribute::represents_from(ensembl_ids),
                ambiguous: ambiguous.get(&result.query_id).cloned().unwrap_or_default(),
                source: AttributeSource::Interaction {
                    bait: baits.contains(result.query_id.as_str()),
                },
            };
            resolution
                .attributes
                .insert(result.query_id.clone(), attribute);
        }

        info!(
            edges = self.edges.len(),
            queried = request.queries.len(),
            resolved = resolution.attributes.len(),
            errors = resolution.issues.len(),
            "interaction gene attributes resolved"
        );
        Ok(resolution)
    }
}
