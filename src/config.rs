use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::download::DEFAULT_MAX_RETRIES;
use crate::error::DownloaderError;
use crate::genequery::DEFAULT_GENE_SERVICE_URL;

pub const DEFAULT_IMAGE_URL: &str = "https://images.proteinatlas.org";
pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_IMAGE_SUFFIX: &str = ".jpg";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub csv: Option<Utf8PathBuf>,
    #[serde(default)]
    pub unique: Option<Utf8PathBuf>,
    #[serde(default)]
    pub apms_edgelist: Option<Utf8PathBuf>,
    #[serde(default)]
    pub apms_baitlist: Option<Utf8PathBuf>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub poolsize: Option<usize>,
    #[serde(default)]
    pub imgsuffix: Option<String>,
    #[serde(default)]
    pub skip_existing: Option<bool>,
    #[serde(default)]
    pub skip_logging: Option<bool>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub gene_service_url: Option<String>,
}

impl Config {
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            csv: overrides.csv.or(self.csv),
            unique: overrides.unique.or(self.unique),
            apms_edgelist: overrides.apms_edgelist.or(self.apms_edgelist),
            apms_baitlist: overrides.apms_baitlist.or(self.apms_baitlist),
            image_url: overrides.image_url.or(self.image_url),
            poolsize: overrides.poolsize.or(self.poolsize),
            imgsuffix: overrides.imgsuffix.or(self.imgsuffix),
            skip_existing: overrides.skip_existing.or(self.skip_existing),
            skip_logging: overrides.skip_logging.or(self.skip_logging),
            max_retries: overrides.max_retries.or(self.max_retries),
            gene_service_url: overrides.gene_service_url.or(self.gene_service_url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub outdir: Utf8PathBuf,
    pub csv: Utf8PathBuf,
    pub unique: Option<Utf8PathBuf>,
    pub apms_edgelist: Option<Utf8PathBuf>,
    pub apms_baitlist: Option<Utf8PathBuf>,
    pub image_url: String,
    pub poolsize: usize,
    pub imgsuffix: String,
    pub skip_existing: bool,
    pub skip_logging: bool,
    pub max_retries: usize,
    pub gene_service_url: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<Config, DownloaderError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let config_path = PathBuf::from(path);
        let content = fs::read_to_string(&config_path)
            .map_err(|_| DownloaderError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| DownloaderError::ConfigParse(err.to_string()))
    }

    /// Fails before anything is written when an input table is absent.
    pub fn resolve_config(
        outdir: Option<Utf8PathBuf>,
        config: Config,
    ) -> Result<ResolvedConfig, DownloaderError> {
        let outdir = outdir
            .filter(|dir| !dir.as_str().trim().is_empty())
            .ok_or(DownloaderError::MissingOutputDirectory)?;
        let csv = config.csv.ok_or(DownloaderError::MissingInput("csv"))?;
        if config.apms_baitlist.is_some() && config.apms_edgelist.is_none() {
            return Err(DownloaderError::MissingInput("apms_edgelist"));
        }
        let poolsize = config.poolsize.unwrap_or(DEFAULT_POOL_SIZE);
        if poolsize == 0 {
            return Err(DownloaderError::InvalidConfig(
                "poolsize must be at least 1".to_string(),
            ));
        }

        require_file(&csv, "csv")?;
        if let Some(unique) = &config.unique {
            require_file(unique, "unique")?;
            if unique.file_name() == csv.file_name() && unique != &csv {
                return Err(DownloaderError::InvalidConfig(format!(
                    "sample table {csv} and unique table {unique} share a file name"
                )));
            }
        }
        if let Some(edgelist) = &config.apms_edgelist {
            require_file(edgelist, "apms_edgelist")?;
        }
        if let Some(baitlist) = &config.apms_baitlist {
            require_file(baitlist, "apms_baitlist")?;
        }

        Ok(ResolvedConfig {
            outdir,
            csv,
            unique: config.unique,
            apms_edgelist: config.apms_edgelist,
            apms_baitlist: config.apms_baitlist,
            image_url: config
                .image_url
                .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            poolsize,
            imgsuffix: config
                .imgsuffix
                .unwrap_or_else(|| DEFAULT_IMAGE_SUFFIX.to_string()),
            skip_existing: config.skip_existing.unwrap_or(false),
            skip_logging: config.skip_logging.unwrap_or(false),
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            gene_service_url: config
                .gene_service_url
                .unwrap_or_else(|| DEFAULT_GENE_SERVICE_URL.to_string()),
        })
    }
}

fn require_file(path: &Utf8Path, name: &'static str) -> Result<(), DownloaderError> {
    if path.as_std_path().is_file() {
        Ok(())
    } else {
        Err(DownloaderError::MissingInput(name))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn inputs() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for name in ["samples.csv", "unique.csv", "edges.tsv", "baits.tsv"] {
            fs::write(root.join(name), "header\n").unwrap();
        }
        (temp, root)
    }

    fn with_csv(root: &Utf8Path) -> Config {
        Config {
            csv: Some(root.join("samples.csv")),
            ..Config::default()
        }
    }

    #[test]
    fn resolve_applies_defaults() {
        let (_temp, root) = inputs();
        let resolved =
            ConfigLoader::resolve_config(Some(root.join("out")), with_csv(&root)).unwrap();
        assert_eq!(resolved.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(resolved.poolsize, 4);
        assert_eq!(resolved.imgsuffix, ".jpg");
        assert_eq!(resolved.max_retries, 5);
        assert!(!resolved.skip_existing);
        assert_eq!(resolved.unique, None);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let (_temp, root) = inputs();
        let file = Config {
            poolsize: Some(8),
            image_url: Some("http://file/".to_string()),
            ..with_csv(&root)
        };
        let cli = Config {
            poolsize: Some(2),
            ..Config::default()
        };
        let resolved =
            ConfigLoader::resolve_config(Some(root.join("out")), file.merge(cli)).unwrap();
        assert_eq!(resolved.poolsize, 2);
        assert_eq!(resolved.image_url, "http://file");
    }

    #[test]
    fn configuration_errors() {
        let (_temp, root) = inputs();
        let out = || Some(root.join("out"));
        assert_matches!(
            ConfigLoader::resolve_config(None, with_csv(&root)),
            Err(DownloaderError::MissingOutputDirectory)
        );
        assert_matches!(
            ConfigLoader::resolve_config(out(), Config::default()),
            Err(DownloaderError::MissingInput("csv"))
        );
        let baits_only = Config {
            apms_baitlist: Some(root.join("baits.tsv")),
            ..with_csv(&root)
        };
        assert_matches!(
            ConfigLoader::resolve_config(out(), baits_only),
            Err(DownloaderError::MissingInput("apms_edgelist"))
        );
        let zero_pool = Config {
            poolsize: Some(0),
            ..with_csv(&root)
        };
        assert_matches!(
            ConfigLoader::resolve_config(out(), zero_pool),
            Err(DownloaderError::InvalidConfig(_))
        );
    }

    #[test]
    fn absent_input_tables_are_rejected() {
        let (_temp, root) = inputs();
        let out = || Some(root.join("out"));
        let missing_csv = Config {
            csv: Some(root.join("does_not_exist.csv")),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(out(), missing_csv).unwrap_err();
        assert_matches!(err, DownloaderError::MissingInput("csv"));
        assert_eq!(err.exit_code(), 2);

        let missing_unique = Config {
            unique: Some(root.join("nope.csv")),
            ..with_csv(&root)
        };
        assert_matches!(
            ConfigLoader::resolve_config(out(), missing_unique),
            Err(DownloaderError::MissingInput("unique"))
        );
        let missing_edges = Config {
            apms_edgelist: Some(root.join("nope.tsv")),
            ..with_csv(&root)
        };
        assert_matches!(
            ConfigLoader::resolve_config(out(), missing_edges),
            Err(DownloaderError::MissingInput("apms_edgelist"))
        );
        let missing_baits = Config {
            apms_edgelist: Some(root.join("edges.tsv")),
            apms_baitlist: Some(root.join("nope.tsv")),
            ..with_csv(&root)
        };
        assert_matches!(
            ConfigLoader::resolve_config(out(), missing_baits),
            Err(DownloaderError::MissingInput("apms_baitlist"))
        );
        assert!(!root.join("out").as_std_path().exists());
    }

    #[test]
    fn unique_table_may_not_shadow_sample_table_copy() {
        let (_temp, root) = inputs();
        fs::create_dir(root.join("other")).unwrap();
        fs::write(root.join("other/samples.csv"), "header\n").unwrap();
        let clash = Config {
            unique: Some(root.join("other/samples.csv")),
            ..with_csv(&root)
        };
        let err = ConfigLoader::resolve_config(Some(root.join("out")), clash).unwrap_err();
        assert_matches!(err, DownloaderError::InvalidConfig(_));
        assert_eq!(err.exit_code(), 2);
    }
}
