use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use colored::*;
use serde::Serialize;

use crate::colormap::{to_hex, ColorAssignment};
use crate::error::Result;
use crate::profile::StackedProfile;

#[derive(Serialize)]
struct JsonGroup<'a> {
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rough: Option<&'a str>,
    mean: f64,
    color: Option<String>,
    values: &'a [f64],
    upper: &'a [f64],
    lower: &'a [f64],
}

#[derive(Serialize)]
struct JsonReport<'a> {
    samples: &'a [String],
    groups: Vec<JsonGroup<'a>>,
}

/// Prints the displayed groups with their mean abundance and colour.
pub fn print_profile_summary(profile: &StackedProfile, colors: &ColorAssignment) {
    println!(
        "{} ({} samples)",
        "Displayed groups:".bold(),
        profile.num_samples().to_string().cyan()
    );
    for (i, group) in profile.groups.iter().enumerate() {
        let hex = colors
            .color(i)
            .map(to_hex)
            .unwrap_or_else(|| "-".to_string());
        let swatch = match colors.color(i) {
            Some(c) => "██".truecolor(c.red, c.green, c.blue),
            None => "  ".normal(),
        };
        let label = match &group.rough {
            Some(rough) if !group.label.starts_with("other ") => {
                format!("{} {}", group.label, format!("[{}]", rough).dimmed())
            }
            _ => group.label.clone(),
        };
        println!(
            "{:>3}. {} {:>7}% {} {}",
            i + 1,
            swatch,
            format!("{:.2}", group.mean * 100.0).magenta(),
            hex.dimmed(),
            label.yellow()
        );
    }
}

/// Writes the profile, bounds and colours as pretty JSON.
pub fn write_json_report(
    profile: &StackedProfile,
    colors: &ColorAssignment,
    output_path: &Path,
) -> Result<()> {
    let report = JsonReport {
        samples: &profile.samples,
        groups: profile
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| JsonGroup {
                label: &g.label,
                rough: g.rough.as_deref(),
                mean: g.mean,
                color: colors.color(i).map(to_hex),
                values: &g.values,
                upper: &g.upper,
                lower: &g.lower,
            })
            .collect(),
    };

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writer.flush()?;
    Ok(())
}
