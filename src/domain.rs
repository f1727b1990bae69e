use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Blue,
    Green,
    Yellow,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Blue, Channel::Green, Channel::Yellow];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Blue => "blue",
            Channel::Green => "green",
            Channel::Yellow => "yellow",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AntibodyCode(String);

impl AntibodyCode {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn url_component(&self) -> &str {
        let code = self.0.as_str();
        match code
            .strip_prefix("HPA")
            .or_else(|| code.strip_prefix("CAB"))
        {
            Some(rest) if !rest.is_empty() => {
                let trimmed = rest.trim_start_matches('0');
                if trimmed.is_empty() {
                    &rest[rest.len() - 1..]
                } else {
                    trimmed
                }
            }
            _ => code,
        }
    }
}

impl fmt::Display for AntibodyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SampleRecord {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "if_plate_id")]
    pub plate_id: String,
    pub position: String,
    pub sample: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub locations: Option<String>,
    pub antibody: AntibodyCode,
    #[serde(default)]
    pub ensembl_ids: Option<String>,
    #[serde(default)]
    pub gene_names: Option<String>,
}

impl SampleRecord {
    pub fn image_stem(&self) -> String {
        format!("{}_{}_{}_", self.plate_id, self.position, self.sample)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UniqueAntibodyRecord {
    pub antibody: AntibodyCode,
    #[serde(default)]
    pub ensembl_ids: Option<String>,
    #[serde(default)]
    pub gene_names: Option<String>,
    #[serde(default)]
    pub atlas_name: Option<String>,
    #[serde(default)]
    pub locations: Option<String>,
    #[serde(default)]
    pub n_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeRecord {
    #[serde(rename = "GeneID1")]
    pub gene_id_1: String,
    #[serde(rename = "Symbol1", default)]
    pub symbol_1: Option<String>,
    #[serde(rename = "GeneID2")]
    pub gene_id_2: String,
    #[serde(rename = "Symbol2", default)]
    pub symbol_2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BaitRecord {
    #[serde(rename = "GeneSymbol")]
    pub gene_symbol: String,
    #[serde(rename = "GeneID")]
    pub gene_id: String,
    #[serde(rename = "# Interactors", default)]
    pub num_interactors: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSource {
    Image {
        antibody: BTreeSet<String>,
        filename: BTreeSet<String>,
    },
    Interaction {
        bait: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneNodeAttribute {
    pub name: String,
    pub represents: String,
    pub ambiguous: String,
    pub source: AttributeSource,
}

impl GeneNodeAttribute {
    pub fn represents_from<S: AsRef<str>>(ensembl_ids: &[S]) -> String {
        let joined = ensembl_ids
            .iter()
            .map(|id| id.as_ref())
            .collect::<Vec<_>>()
            .join(";");
        format!("ensembl:{joined}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antibody_url_component_strips_prefix_and_padding() {
        assert_eq!(AntibodyCode::new("HPA000992").url_component(), "992");
        assert_eq!(AntibodyCode::new("CAB000001").url_component(), "1");
        assert_eq!(AntibodyCode::new("HPA040086").url_component(), "40086");
        assert_eq!(AntibodyCode::new("AMAb91234").url_component(), "AMAb91234");
        assert_eq!(AntibodyCode::new("HPA000000").url_component(), "0");
        assert_eq!(AntibodyCode::new("HPA").url_component(), "HPA");
    }

    #[test]
    fn image_stem_is_channel_agnostic() {
        let record = SampleRecord {
            filename: Some("/archive/1/1_A1_1_".to_string()),
            plate_id: "1".to_string(),
            position: "A1".to_string(),
            sample: "1".to_string(),
            status: None,
            locations: None,
            antibody: AntibodyCode::new("HPA000992"),
            ensembl_ids: Some("ENSG00000066455".to_string()),
            gene_names: Some("GOLGA5".to_string()),
        };
        assert_eq!(record.image_stem(), "1_A1_1_");
    }

    #[test]
    fn represents_joins_all_ids() {
        let ids = ["ENSG1", "ENSG2", "ENSG3"];
        assert_eq!(
            GeneNodeAttribute::represents_from(&ids),
            "ensembl:ENSG1;ENSG2;ENSG3"
        );
    }
}
