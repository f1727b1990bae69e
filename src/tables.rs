use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use camino::Utf8Path;
use serde::de::DeserializeOwned;

use crate::domain::{
    AttributeSource, BaitRecord, EdgeRecord, GeneNodeAttribute, SampleRecord,
    UniqueAntibodyRecord,
};
use crate::error::DownloaderError;
use crate::network::ResolvedEdge;

pub const IMAGE_ATTRIBUTE_HEADER: [&str; 5] = ["name", "represents", "ambiguous", "antibody", "filename"];
pub const APMS_ATTRIBUTE_HEADER: [&str; 4] = ["name", "represents", "ambiguous", "bait"];
pub const EDGELIST_HEADER: [&str; 2] = ["geneA", "geneB"];

fn table_error(path: &Utf8Path, err: impl ToString) -> DownloaderError {
    DownloaderError::Table {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    }
}

pub fn read_delimited<T: DeserializeOwned>(
    path: &Utf8Path,
    delimiter: u8,
) -> Result<Vec<T>, DownloaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path.as_std_path())
        .map_err(|err| table_error(path, err))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|err| table_error(path, err))
}

pub fn read_samples(path: &Utf8Path) -> Result<Vec<SampleRecord>, DownloaderError> {
    read_delimited(path, b',')
}

pub fn read_unique_antibodies(path: &Utf8Path) -> Result<Vec<UniqueAntibodyRecord>, DownloaderError> {
    read_delimited(path, b',')
}

pub fn read_edges(path: &Utf8Path) -> Result<Vec<EdgeRecord>, DownloaderError> {
    read_delimited(path, b'\t')
}

pub fn read_baits(path: &Utf8Path) -> Result<Vec<BaitRecord>, DownloaderError> {
    read_delimited(path, b'\t')
}

fn tsv_writer(path: &Utf8Path) -> Result<csv::Writer<File>, DownloaderError> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(|err| DownloaderError::Filesystem(format!("{path}: {err}")))
}

fn write_rows<I>(path: &Utf8Path, header: &[&str], rows: I) -> Result<(), DownloaderError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = tsv_writer(path)?;
    writer
        .write_record(header)
        .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| DownloaderError::Filesystem(err.to_string()))
}

fn join(values: &std::collections::BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(",")
}

fn attribute_row(attribute: &GeneNodeAttribute) -> Vec<String> {
    let mut row = vec![
        attribute.name.clone(),
        attribute.represents.clone(),
        attribute.ambiguous.clone(),
    ];
    match &attribute.source {
        AttributeSource::Image { antibody, filename } => {
            row.push(join(antibody));
            row.push(join(filename));
        }
        AttributeSource::Interaction { bait } => {
            row.push(if *bait { "True" } else { "False" }.to_string());
        }
    }
    row
}

pub fn write_gene_node_attributes(
    path: &Utf8Path,
    header: &[&str],
    attributes: &BTreeMap<String, GeneNodeAttribute>,
) -> Result<(), DownloaderError> {
    write_rows(path, header, attributes.values().map(attribute_row))
}

pub fn write_edgelist(path: &Utf8Path, edges: &[ResolvedEdge]) -> Result<(), DownloaderError> {
    write_rows(
        path,
        &EDGELIST_HEADER,
        edges
            .iter()
            .map(|edge| vec![edge.gene_a.clone(), edge.gene_b.clone()]),
    )
}

pub fn write_errors(path: &Utf8Path, errors: &[String]) -> Result<bool, DownloaderError> {
    if errors.is_empty() {
        return Ok(false);
    }
    let mut file = File::create(path.as_std_path())
        .map_err(|err| DownloaderError::Filesystem(format!("{path}: {err}")))?;
    for error in errors {
        writeln!(file, "{error}").map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn read_sample_table() {
        let (_temp, root) = temp_root();
        let path = root.join("samples.csv");
        fs::write(
            &path,
            "filename,if_plate_id,position,sample,status,locations,antibody,ensembl_ids,gene_names\n\
             /archive/1/1_A1_1_,1,A1,1,35,Golgi apparatus,HPA000992,ENSG00000066455,GOLGA5\n\
             /archive/2/2_A3_4_,2,A3,4,35,Nucleoplasm,HPA040086,\"ENSG1, ENSG2\",\"A, B\"\n",
        )
        .unwrap();
        let samples = read_samples(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].plate_id, "1");
        assert_eq!(samples[0].antibody.as_str(), "HPA000992");
        assert_eq!(samples[1].ensembl_ids.as_deref(), Some("ENSG1, ENSG2"));
    }

    #[test]
    fn read_edge_and_bait_tables() {
        let (_temp, root) = temp_root();
        let edges_path = root.join("edges.tsv");
        let baits_path = root.join("baits.tsv");
        fs::write(&edges_path, "GeneID1\tSymbol1\tGeneID2\tSymbol2\n10159\tATP6AP2\t2\tA2M\n")
            .unwrap();
        fs::write(&baits_path, "GeneSymbol\tGeneID\t# Interactors\n\"ADA\"\t\"100\"\t1.\n")
            .unwrap();
        let edges = read_edges(&edges_path).unwrap();
        assert_eq!(edges[0].gene_id_1, "10159");
        assert_eq!(edges[0].symbol_2.as_deref(), Some("A2M"));
        let baits = read_baits(&baits_path).unwrap();
        assert_eq!(baits[0].gene_id, "100");
        assert_eq!(baits[0].num_interactors, Some(1.0));
    }

    #[test]
    fn missing_table_is_table_error() {
        let (_temp, root) = temp_root();
        let err = read_samples(&root.join("nope.csv")).unwrap_err();
        assert_matches!(err, DownloaderError::Table { .. });
    }

    #[test]
    fn write_image_attributes_and_skip_empty_errors() {
        let (_temp, root) = temp_root();
        let path = root.join("image_gene_node_attributes.tsv");
        let attributes = BTreeMap::from([(
            "ENSG00000066455".to_string(),
            GeneNodeAttribute {
                name: "GOLGA5".to_string(),
                represents: "ensembl:ENSG00000066455".to_string(),
                ambiguous: String::new(),
                source: AttributeSource::Image {
                    antibody: BTreeSet::from(["HPA000992".to_string()]),
                    filename: BTreeSet::from(["1_A1_1_".to_string(), "2_A3_4_".to_string()]),
                },
            },
        )]);
        write_gene_node_attributes(&path, &IMAGE_ATTRIBUTE_HEADER, &attributes).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "name\trepresents\tambiguous\tantibody\tfilename");
        assert_eq!(
            lines[1],
            "GOLGA5\tensembl:ENSG00000066455\t\tHPA000992\t1_A1_1_,2_A3_4_"
        );

        let errors_path = root.join("image_gene_node_attributes.errors");
        assert!(!write_errors(&errors_path, &[]).unwrap());
        assert!(!errors_path.as_std_path().exists());
        assert!(write_errors(&errors_path, &["one".to_string(), "two".to_string()]).unwrap());
        assert_eq!(fs::read_to_string(&errors_path).unwrap(), "one\ntwo\n");
    }
}
