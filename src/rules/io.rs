//! Reading rule records from TSV or JSON files.

use std::path::Path;

use crate::common::io::open_read_maybe_gz;

use super::RuleRecord;

/// Whether `path` names a (possibly gzipped) JSON file.
fn is_json<P: AsRef<Path>>(path: P) -> bool {
    let name = path.as_ref().to_string_lossy();
    name.ends_with(".json") || name.ends_with(".json.gz")
}

/// Load rule records from `path`.
///
/// JSON files hold an array of records; all other files are read as
/// tab-separated values with a header line and `#` comments.
pub fn load_records<P>(path: P) -> Result<Vec<RuleRecord>, anyhow::Error>
where
    P: AsRef<Path>,
{
    tracing::debug!("loading rule records from {:?}", path.as_ref());
    let reader = open_read_maybe_gz(path.as_ref())?;
    let records = if is_json(path.as_ref()) {
        serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("could not parse {:?}: {}", path.as_ref(), e))?
    } else {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .comment(Some(b'#'))
            .from_reader(reader);
        csv_reader
            .deserialize()
            .collect::<Result<Vec<RuleRecord>, _>>()
            .map_err(|e| anyhow::anyhow!("could not parse {:?}: {}", path.as_ref(), e))?
    };
    tracing::debug!("... loaded {} rule records", records.len());
    Ok(records)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::rules::{test::compound, RuleKind};

    #[test]
    fn load_records_tsv() -> Result<(), anyhow::Error> {
        let records = super::load_records("tests/data/rules/hivdb-mini.tsv")?;

        assert_eq!(records.len(), 12);
        assert_eq!(records[0].gene, "RT");
        assert_eq!(records[0].kind, RuleKind::Individual);
        assert_eq!(records[0].group, None);
        assert_eq!(
            records[9],
            compound("AZT", "tam-pathway", "41+210", "L+W", 10.0)
        );

        Ok(())
    }

    #[test]
    fn load_records_json() -> Result<(), anyhow::Error> {
        let tsv = super::load_records("tests/data/rules/hivdb-mini.tsv")?;
        let json = super::load_records("tests/data/rules/hivdb-mini.json")?;

        assert_eq!(json, tsv);

        Ok(())
    }

    #[test]
    fn load_records_missing_file() {
        assert!(super::load_records("tests/data/rules/does-not-exist.tsv").is_err());
    }
}
