use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::error::DownloaderError;

pub const DEFAULT_GENE_SERVICE_URL: &str = "https://mygene.info/v3";
pub const SPECIES_HUMAN: &str = "human";
pub const SCOPE_ENSEMBL_GENE: &str = "ensembl.gene";
pub const FIELD_ENSEMBL_GENE: &str = "ensembl.gene";
pub const FIELD_SYMBOL: &str = "symbol";

const QUERY_CHUNK: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneQueryRequest {
    pub queries: Vec<String>,
    pub species: String,
    pub scopes: Option<String>,
    pub fields: Vec<String>,
}

impl GeneQueryRequest {
    pub fn symbols_and_ensembl(queries: Vec<String>, scopes: Option<&str>) -> Self {
        Self {
            queries,
            species: SPECIES_HUMAN.to_string(),
            scopes: scopes.map(str::to_string),
            fields: vec![FIELD_ENSEMBL_GENE.to_string(), FIELD_SYMBOL.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawGeneQueryResult")]
pub struct GeneQueryResult {
    pub query_id: String,
    pub symbol: Option<String>,
    pub ensembl_gene_ids: Option<Vec<String>>,
    pub not_found: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnsembl {
    #[serde(default)]
    gene: Option<OneOrMany<String>>,
}

#[derive(Debug, Deserialize)]
struct RawGeneQueryResult {
    query: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    ensembl: Option<OneOrMany<RawEnsembl>>,
    #[serde(default)]
    notfound: bool,
}

impl From<RawGeneQueryResult> for GeneQueryResult {
    fn from(raw: RawGeneQueryResult) -> Self {
        let ensembl_gene_ids = raw.ensembl.map(|entries| {
            let mut ids: Vec<String> = Vec::new();
            for entry in entries.into_vec() {
                for gene in entry.gene.map(OneOrMany::into_vec).unwrap_or_default() {
                    if !ids.contains(&gene) {
                        ids.push(gene);
                    }
                }
            }
            ids
        });
        Self {
            query_id: raw.query,
            symbol: raw.symbol,
            ensembl_gene_ids,
            not_found: raw.notfound,
        }
    }
}

/// Batch symbol / Ensembl lookup. Results may cover only a subset of the queries
/// and come back in any order.
pub trait GeneLookupClient: Send + Sync {
    fn query_many(&self, request: &GeneQueryRequest) -> Result<Vec<GeneQueryResult>, DownloaderError>;
}

impl<T: GeneLookupClient + ?Sized> GeneLookupClient for &T {
    fn query_many(&self, request: &GeneQueryRequest) -> Result<Vec<GeneQueryResult>, DownloaderError> {
        (**self).query_many(request)
    }
}

#[derive(Clone)]
pub struct MyGeneHttpClient {
    client: Client,
    base_url: String,
}

impl MyGeneHttpClient {
    pub fn new(base_url: &str) -> Result<Self, DownloaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cellmaps-downloader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DownloaderError::GeneQueryHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| DownloaderError::GeneQueryHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, DownloaderError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(DownloaderError::GeneQueryHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, DownloaderError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "gene service request failed".to_string());
        Err(DownloaderError::GeneQueryStatus { status, message })
    }

    fn query_chunk(
        &self,
        request: &GeneQueryRequest,
        chunk: &[String],
    ) -> Result<Vec<GeneQueryResult>, DownloaderError> {
        let mut form = vec![
            ("q", chunk.join(",")),
            ("fields", request.fields.join(",")),
            ("species", request.species.clone()),
        ];
        if let Some(scopes) = &request.scopes {
            form.push(("scopes", scopes.clone()));
        }
        let url = self.query_url();
        let response = self.send_with_retries(|| self.client.post(&url).form(&form))?;
        let response = Self::handle_status(response)?;
        response
            .json::<Vec<GeneQueryResult>>()
            .map_err(|err| DownloaderError::GeneQueryHttp(err.to_string()))
    }
}

impl GeneLookupClient for MyGeneHttpClient {
    fn query_many(&self, request: &GeneQueryRequest) -> Result<Vec<GeneQueryResult>, DownloaderError> {
        let mut results = Vec::new();
        for chunk in request.queries.chunks(QUERY_CHUNK) {
            let answers = self.query_chunk(request, chunk)?;
            debug!(requested = chunk.len(), answered = answers.len(), "gene service chunk");
            results.extend(answers.into_iter().filter(|result| !result.not_found));
        }
        Ok(results)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ensembl_object() {
        let raw = r#"{"query": "2", "_id": "2", "_score": 1.55,
                      "ensembl": {"gene": "ENSG00000175899"}, "symbol": "A2M"}"#;
        let result: GeneQueryResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.query_id, "2");
        assert_eq!(result.symbol.as_deref(), Some("A2M"));
        assert_eq!(
            result.ensembl_gene_ids,
            Some(vec!["ENSG00000175899".to_string()])
        );
    }

    #[test]
    fn parse_ensembl_list() {
        let raw = r#"{"query": "ENSG00000183570", "symbol": "PCBP3",
                      "ensembl": [{"gene": "ENSG00000183570"},
                                  {"gene": "ENSG00000278740"},
                                  {"gene": ["ENSG00000281113", "ENSG00000183570"]}]}"#;
        let result: GeneQueryResult = serde_json::from_str(raw).unwrap();
        assert_eq!(
            result.ensembl_gene_ids,
            Some(vec![
                "ENSG00000183570".to_string(),
                "ENSG00000278740".to_string(),
                "ENSG00000281113".to_string(),
            ])
        );
    }

    #[test]
    fn parse_missing_fields_and_notfound() {
        let raw = r#"[{"query": "16", "symbol": "AARS1"},
                      {"query": "bogus", "notfound": true}]"#;
        let results: Vec<GeneQueryResult> = serde_json::from_str(raw).unwrap();
        assert_eq!(results[0].ensembl_gene_ids, None);
        assert!(!results[0].not_found);
        assert!(results[1].not_found);
        assert_eq!(results[1].symbol, None);
    }
}
