use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use rayon::prelude::*;

use crate::error::Result;
use crate::table_parser::AbundanceTable;
use crate::taxonomy::TaxonomyLabels;

const BUFFER_SIZE: usize = 256 * 1024; // 256KB buffer for writing

// Placeholder written for a level missing from a lineage
const MISSING_LEVEL: &str = "NA";

/// One taxon of the collapsed table
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedRow {
    /// Lineage from the top level down to the collapse level
    pub path: Vec<Option<String>>,
    /// Relative abundance per selected sample
    pub values: Vec<f64>,
}

impl CollapsedRow {
    /// Name at `level`, or an empty string when the lineage skips it.
    pub fn name_at(&self, level: usize) -> &str {
        self.path
            .get(level)
            .and_then(|n| n.as_deref())
            .unwrap_or("")
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }
}

/// The abundance table re-aggregated to a single taxonomic level
#[derive(Debug, Clone)]
pub struct CollapsedTable {
    pub level: usize,
    pub samples: Vec<String>,
    pub rows: Vec<CollapsedRow>,
}

impl CollapsedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Per-sample column totals.
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.samples.len()];
        for row in &self.rows {
            for (sum, value) in sums.iter_mut().zip(&row.values) {
                *sum += value;
            }
        }
        sums
    }

    /// Writes the collapsed matrix as TSV, one column per lineage level.
    pub fn write_matrix<P: AsRef<Path>>(&self, output_file: P) -> Result<()> {
        let file = File::create(output_file)?;
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);

        for level in 0..=self.level {
            if level > 0 {
                write!(writer, "\t")?;
            }
            write!(writer, "level_{}", level)?;
        }
        for sample in &self.samples {
            write!(writer, "\t{}", sample)?;
        }
        writeln!(writer)?;

        for row in &self.rows {
            let lineage: Vec<&str> = row
                .path
                .iter()
                .map(|n| n.as_deref().unwrap_or(MISSING_LEVEL))
                .collect();
            write!(writer, "{}", lineage.join("\t"))?;
            for value in &row.values {
                write!(writer, "\t{:.6}", value)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Gets the table collapsed to `level` as relative abundances.
///
/// A row is kept when it names `level`. With `consider_nan` set (tables that
/// concatenate every rank, as Kraken/Bracken and MetaPhlAn produce) the row
/// must also stop at `level`, so each organism is counted once. Each sample
/// is then scaled to sum to 1 over the kept rows and rows sharing the same
/// lineage are summed.
pub fn level_taxonomy(
    table: &AbundanceTable,
    taxa: &TaxonomyLabels,
    samples: &[usize],
    level: usize,
    consider_nan: bool,
) -> Result<CollapsedTable> {
    let kept: Vec<usize> = (0..table.num_rows())
        .filter(|&row| {
            taxa.has_level(row, level) && !(consider_nan && taxa.has_level(row, level + 1))
        })
        .collect();
    debug!(
        "Level {}: keeping {} of {} rows",
        level,
        kept.len(),
        table.num_rows()
    );

    let sample_names: Vec<String> = samples
        .iter()
        .map(|&i| table.sample_columns[i].clone())
        .collect();

    let mut totals = vec![0.0; samples.len()];
    for &row in &kept {
        for (total, &col) in totals.iter_mut().zip(samples) {
            *total += table.values[row][col];
        }
    }
    for (name, total) in sample_names.iter().zip(&totals) {
        if *total <= 0.0 {
            warn!("Sample {} has no counts at level {}; it will be plotted as empty", name, level);
        }
    }

    let normalized: Vec<(Vec<Option<String>>, Vec<f64>)> = kept
        .par_iter()
        .map(|&row| {
            let values = samples
                .iter()
                .zip(&totals)
                .map(|(&col, &total)| {
                    if total > 0.0 {
                        table.values[row][col] / total
                    } else {
                        0.0
                    }
                })
                .collect();
            (taxa.path(row, level), values)
        })
        .collect();

    // Rows with the same lineage (e.g. strains below the level) are pooled
    let mut grouped: BTreeMap<Vec<Option<String>>, Vec<f64>> = BTreeMap::new();
    for (path, values) in normalized {
        match grouped.get_mut(&path) {
            Some(existing) => {
                for (acc, v) in existing.iter_mut().zip(values) {
                    *acc += v;
                }
            }
            None => {
                grouped.insert(path, values);
            }
        }
    }

    if grouped.is_empty() {
        warn!("No rows of the table are resolved at level {}", level);
    }

    Ok(CollapsedTable {
        level,
        samples: sample_names,
        rows: grouped
            .into_iter()
            .map(|(path, values)| CollapsedRow { path, values })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_parser::parse_table;
    use crate::taxonomy::extract_label_array;

    const MULTILEVEL: &str = "taxon_name\tS1\tS2\n\
        k__Bacteria\t100\t100\n\
        k__Bacteria|p__Firmicutes\t60\t20\n\
        k__Bacteria|p__Bacteroidetes\t40\t80\n\
        k__Bacteria|p__Firmicutes|c__Bacilli\t60\t20\n\
        k__Bacteria|p__Bacteroidetes|c__Bacteroidia\t30\t80\n\
        k__Bacteria|p__Bacteroidetes|c__Bacteroidia\t10\t0\n";

    fn collapse(level: usize, consider_nan: bool) -> CollapsedTable {
        let table = parse_table(MULTILEVEL.as_bytes(), "taxon_name").unwrap();
        let taxa = extract_label_array(&table.taxonomy, "|");
        let samples = table.select_samples(None).unwrap();
        level_taxonomy(&table, &taxa, &samples, level, consider_nan).unwrap()
    }

    #[test]
    fn test_multilevel_keeps_rows_ending_at_level() {
        let collapsed = collapse(1, true);
        assert_eq!(collapsed.rows.len(), 2);
        // Sorted by lineage
        assert_eq!(collapsed.rows[0].name_at(1), "p__Bacteroidetes");
        assert_eq!(collapsed.rows[0].values, vec![0.4, 0.8]);
        assert_eq!(collapsed.rows[1].name_at(1), "p__Firmicutes");
        assert_eq!(collapsed.rows[1].values, vec![0.6, 0.2]);
    }

    #[test]
    fn test_duplicate_lineages_are_summed() {
        let collapsed = collapse(2, true);
        assert_eq!(collapsed.rows.len(), 2);
        let bacteroidia = &collapsed.rows[0];
        assert_eq!(bacteroidia.name_at(2), "c__Bacteroidia");
        assert!((bacteroidia.values[0] - 0.4).abs() < 1e-12);
        assert!((bacteroidia.values[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_columns_sum_to_one() {
        for level in 0..3 {
            let collapsed = collapse(level, true);
            for sum in collapsed.column_sums() {
                assert!((sum - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_single_level_table_without_nan_filter() {
        // Without the filter, deeper rows are pooled into their level-1 lineage
        let collapsed = collapse(1, false);
        assert_eq!(collapsed.rows.len(), 2);
        for sum in collapsed.column_sums() {
            assert!((sum - 1.0).abs() < 1e-9);
        }
        assert!((collapsed.rows[1].values[0] - 120.0 / 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sample_stays_zero() {
        let text = "taxon_name\tS1\tS2\nk__A|p__B\t5\t0\nk__A|p__C\t5\t0\n";
        let table = parse_table(text.as_bytes(), "taxon_name").unwrap();
        let taxa = extract_label_array(&table.taxonomy, "|");
        let collapsed = level_taxonomy(&table, &taxa, &[0, 1], 1, true).unwrap();
        assert_eq!(collapsed.column_sums(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_write_matrix() {
        let collapsed = collapse(1, true);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collapsed.tsv");
        collapsed.write_matrix(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("level_0\tlevel_1\tS1\tS2"));
        assert_eq!(
            lines.next(),
            Some("k__Bacteria\tp__Bacteroidetes\t0.400000\t0.800000")
        );
    }
}
