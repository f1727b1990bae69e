use std::collections::BTreeMap;

use tracing::info;

use crate::domain::{EdgeRecord, GeneNodeAttribute};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub gene_a: String,
    pub gene_b: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectedNetwork {
    pub edges: Vec<ResolvedEdge>,
    pub errors: Vec<String>,
}

pub fn project_edges(
    edges: &[EdgeRecord],
    attributes: &BTreeMap<String, GeneNodeAttribute>,
) -> ProjectedNetwork {
    let mut network = ProjectedNetwork::default();
    for edge in edges {
        let gene_a = resolved_name(attributes, &edge.gene_id_1);
        let gene_b = resolved_name(attributes, &edge.gene_id_2);
        match (gene_a, gene_b) {
            (Some(gene_a), Some(gene_b)) => network.edges.push(ResolvedEdge {
                gene_a: gene_a.to_string(),
                gene_b: gene_b.to_string(),
            }),
            (gene_a, gene_b) => {
                let mut missing = Vec::new();
                if gene_a.is_none() {
                    missing.push(edge.gene_id_1.as_str());
                }
                if gene_b.is_none() {
                    missing.push(edge.gene_id_2.as_str());
                }
                network.errors.push(format!(
                    "Dropping edge {} - {}: no resolved name for {}",
                    edge.gene_id_1,
                    edge.gene_id_2,
                    missing.join(", ")
                ));
            }
        }
    }
    info!(
        edges_in = edges.len(),
        edges_out = network.edges.len(),
        dropped = network.errors.len(),
        "interaction network projected"
    );
    network
}

fn resolved_name<'a>(
    attributes: &'a BTreeMap<String, GeneNodeAttribute>,
    gene_id: &str,
) -> Option<&'a str> {
    attributes
        .get(gene_id.trim())
        .map(|attribute| attribute.name.trim())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeSource;

    fn attribute(name: &str) -> GeneNodeAttribute {
        GeneNodeAttribute {
            name: name.to_string(),
            represents: "ensembl:ENSG0".to_string(),
            ambiguous: String::new(),
            source: AttributeSource::Interaction { bait: false },
        }
    }

    fn edge(a: &str, b: &str) -> EdgeRecord {
        EdgeRecord {
            gene_id_1: a.to_string(),
            symbol_1: None,
            gene_id_2: b.to_string(),
            symbol_2: None,
        }
    }

    #[test]
    fn drops_unresolved_and_blank_endpoints() {
        let attributes = BTreeMap::from([
            ("2".to_string(), attribute("A2M")),
            ("10159".to_string(), attribute("ATP6AP2")),
            ("16".to_string(), attribute("  ")),
        ]);
        let edges = vec![
            edge("10159", "2"),
            edge("10159", "999"),
            edge("16", "2"),
            edge("16, 17", "2"),
        ];
        let network = project_edges(&edges, &attributes);

        assert_eq!(
            network.edges,
            vec![ResolvedEdge {
                gene_a: "ATP6AP2".to_string(),
                gene_b: "A2M".to_string(),
            }]
        );
        assert_eq!(network.errors.len(), 3);
        assert_eq!(edges.len() - network.edges.len(), network.errors.len());
        assert!(network.errors[0].contains("999"));
    }
}
