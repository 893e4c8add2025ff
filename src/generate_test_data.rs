use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use log::info;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, TaxaplotError};

const RANK_PREFIXES: &[&str] = &["k", "p", "c", "o", "f", "g", "s"];

/// Structure to define generation parameters
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    pub output_file: PathBuf,
    pub num_samples: usize,
    /// Number of leaf lineages
    pub num_taxa: usize,
    /// Number of levels in each lineage
    pub max_depth: usize,
    /// Maximum branching at each level
    pub max_children: usize,
    /// Reads per sample
    pub reads_per_sample: u64,
    /// Probability that a leaf is present in a given sample
    pub prevalence: f64,
    pub seed: Option<u64>,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("test_table.tsv"),
            num_samples: 24,
            num_taxa: 60,
            max_depth: 7,
            max_children: 4,
            reads_per_sample: 100_000,
            prevalence: 0.9,
            seed: None,
        }
    }
}

impl GeneratorParams {
    /// Adjusts the parameters for a named data shape.
    pub fn with_preset(mut self, preset: &str) -> Result<Self> {
        match preset {
            "balanced" => {}
            "wide" => {
                // Few levels, many siblings
                self.max_depth = 3;
                self.max_children = 30;
            }
            "deep" => {
                // Full lineages with little branching
                self.max_depth = 7;
                self.max_children = 2;
            }
            "sparse" => {
                // Most taxa absent from most samples
                self.prevalence = 0.3;
            }
            other => {
                return Err(TaxaplotError::InvalidArgument(format!(
                    "unknown preset '{}' (balanced, wide, deep, sparse)",
                    other
                )))
            }
        }
        Ok(self)
    }
}

fn lineage_name(path: &[usize]) -> String {
    path.iter()
        .enumerate()
        .map(|(level, _)| {
            let prefix = RANK_PREFIXES.get(level).copied().unwrap_or("x");
            let ids: Vec<String> = path[..=level].iter().map(usize::to_string).collect();
            format!("{}__taxon_{}", prefix, ids.join("_"))
        })
        .collect::<Vec<_>>()
        .join("|")
}

// Random leaf paths, each a child index per level
fn random_lineages<R: Rng>(params: &GeneratorParams, rng: &mut R) -> Vec<Vec<usize>> {
    let mut leaves: Vec<Vec<usize>> = Vec::with_capacity(params.num_taxa);
    let mut attempts = 0;
    while leaves.len() < params.num_taxa && attempts < params.num_taxa * 20 {
        attempts += 1;
        let path: Vec<usize> = (0..params.max_depth)
            .map(|level| {
                // The top levels branch less than the leaves
                let width = if level == 0 {
                    1 + params.max_children / 4
                } else {
                    params.max_children
                };
                rng.gen_range(0..width.max(1))
            })
            .collect();
        if !leaves.contains(&path) {
            leaves.push(path);
        }
    }
    leaves
}

/// Generates a multilevel abundance table.
///
/// Every ancestor of a leaf gets its own row holding the summed counts, the
/// way Kraken- and MetaPhlAn-style tables list every rank.
pub fn generate_table(params: &GeneratorParams) -> Result<usize> {
    if params.num_samples == 0 || params.num_taxa == 0 || params.max_depth == 0 {
        return Err(TaxaplotError::InvalidArgument(
            "samples, taxa and depth must all be positive".to_string(),
        ));
    }

    let start = Instant::now();
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let leaves = random_lineages(params, &mut rng);
    // Skewed base abundances so a handful of taxa dominate
    let base: Vec<f64> = (0..leaves.len())
        .map(|_| rng.gen_range(0.0f64..1.0).powi(4) + 1e-3)
        .collect();

    let mut counts: BTreeMap<Vec<usize>, Vec<u64>> = BTreeMap::new();
    for sample in 0..params.num_samples {
        let mut weights: Vec<f64> = base
            .iter()
            .map(|&w| {
                if rng.gen_bool(params.prevalence.clamp(0.0, 1.0)) {
                    w * rng.gen_range(0.5..1.5)
                } else {
                    0.0
                }
            })
            .collect();
        if weights.iter().all(|&w| w == 0.0) {
            weights[0] = 1.0;
        }

        let distribution = WeightedIndex::new(&weights)
            .map_err(|e| TaxaplotError::InvalidArgument(e.to_string()))?;
        let mut leaf_counts = vec![0u64; leaves.len()];
        for _ in 0..params.reads_per_sample {
            leaf_counts[distribution.sample(&mut rng)] += 1;
        }

        for (leaf, &count) in leaves.iter().zip(&leaf_counts) {
            for depth in 1..=leaf.len() {
                let row = counts
                    .entry(leaf[..depth].to_vec())
                    .or_insert_with(|| vec![0; params.num_samples]);
                row[sample] += count;
            }
        }
    }

    let file = File::create(&params.output_file)?;
    let mut writer = BufWriter::new(file);

    write!(writer, "taxon_name")?;
    for sample in 0..params.num_samples {
        write!(writer, "\tsample_{:03}", sample + 1)?;
    }
    writeln!(writer)?;

    // BTreeMap order puts every ancestor right before its descendants
    for (path, row) in &counts {
        write!(writer, "{}", lineage_name(path))?;
        for count in row {
            write!(writer, "\t{}", count)?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;

    info!(
        "Generated {} rows ({} leaf taxa x {} samples) in {:.2?}",
        counts.len(),
        leaves.len(),
        params.num_samples,
        start.elapsed()
    );
    Ok(counts.len())
}
