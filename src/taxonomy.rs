use crate::error::{Result, TaxaplotError};

pub const DEFAULT_DELIMITER: &str = "|";

// Rank codes and names by their position in a lineage string
const TAXON_LEVELS: &[(&str, &str)] = &[
    ("K", "kingdom"),
    ("P", "phylum"),
    ("C", "class"),
    ("O", "order"),
    ("F", "family"),
    ("G", "genus"),
    ("S", "species"),
];

/// Taxonomy strings parsed into levels; `None` marks an absent level.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyLabels {
    rows: Vec<Vec<Option<String>>>,
}

impl TaxonomyLabels {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Name of `row` at `level`, if that level is present.
    pub fn get(&self, row: usize, level: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|levels| levels.get(level))
            .and_then(|name| name.as_deref())
    }

    pub fn has_level(&self, row: usize, level: usize) -> bool {
        self.get(row, level).is_some()
    }

    /// The lineage of `row` truncated to levels `0..=level`.
    pub fn path(&self, row: usize, level: usize) -> Vec<Option<String>> {
        (0..=level)
            .map(|l| self.get(row, l).map(String::from))
            .collect()
    }

    /// Deepest level present in any row.
    pub fn depth(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Converts delimited taxonomy strings into per-level labels.
pub fn extract_label_array<S: AsRef<str>>(taxonomy: &[S], delimiter: &str) -> TaxonomyLabels {
    let rows = taxonomy
        .iter()
        .map(|tax| {
            tax.as_ref()
                .split(delimiter)
                .map(str::trim)
                .map(|part| (!part.is_empty()).then(|| part.to_string()))
                .collect()
        })
        .collect();
    TaxonomyLabels { rows }
}

/// Resolves a level argument given as an index or a rank code/name.
pub fn resolve_level(arg: &str) -> Result<usize> {
    let arg = arg.trim();
    if let Ok(index) = arg.parse::<usize>() {
        return Ok(index);
    }

    let lower = arg.to_ascii_lowercase();
    if lower == "d" || lower == "domain" {
        return Ok(0);
    }
    TAXON_LEVELS
        .iter()
        .position(|(code, name)| code.eq_ignore_ascii_case(&lower) || *name == lower)
        .ok_or_else(|| TaxaplotError::InvalidLevel(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_label_array() {
        let labels = extract_label_array(
            &["k__Bacteria| p__Firmicutes |c__Bacilli", "k__Archaea", "k__Bacteria||c__X"],
            "|",
        );
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0, 1), Some("p__Firmicutes"));
        assert_eq!(labels.get(0, 3), None);
        assert_eq!(labels.get(1, 1), None);
        assert!(!labels.has_level(2, 1));
        assert_eq!(labels.get(2, 2), Some("c__X"));
        assert_eq!(labels.depth(), 3);
        assert_eq!(
            labels.path(0, 1),
            vec![Some("k__Bacteria".to_string()), Some("p__Firmicutes".to_string())]
        );
    }

    #[test]
    fn test_custom_delimiter() {
        let labels = extract_label_array(&["Bacteria;Firmicutes"], ";");
        assert_eq!(labels.get(0, 1), Some("Firmicutes"));
    }

    #[test]
    fn test_resolve_level() {
        assert_eq!(resolve_level("3").unwrap(), 3);
        assert_eq!(resolve_level("genus").unwrap(), 5);
        assert_eq!(resolve_level("Phylum").unwrap(), 1);
        assert_eq!(resolve_level("S").unwrap(), 6);
        assert_eq!(resolve_level("domain").unwrap(), 0);
        assert!(matches!(resolve_level("tribe"), Err(TaxaplotError::InvalidLevel(_))));
    }
}
