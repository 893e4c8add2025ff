use std::path::Path;

use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::colormap::{ColorAssignment, Rgb};
use crate::error::{Result, TaxaplotError};
use crate::profile::StackedProfile;

const FONT: &str = "sans-serif";
const POINTS_PER_INCH: f64 = 72.0;
const LEGEND_SWATCH_PT: f64 = 8.0;
const Y_TICK: f64 = 0.25;
// Stepped ranges stop short of their end; nudge it so 1.00 gets a tick
const Y_MAX: f64 = 1.0 + 1e-9;

/// Image formats the figure can be saved as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureFormat {
    Png,
    Svg,
}

/// Infers the output format from the file extension.
pub fn figure_format(path: &Path) -> Result<FigureFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => Ok(FigureFormat::Png),
        "svg" => Ok(FigureFormat::Svg),
        _ => Err(TaxaplotError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Figure layout
#[derive(Debug, Clone, Copy)]
pub struct PlotOptions {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: u32,
    /// Interval between sample ticks
    pub sample_interval: usize,
    /// Axes rectangle as figure fractions: left, bottom, width, height
    pub axes: (f64, f64, f64, f64),
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            width_in: 8.0,
            height_in: 4.0,
            dpi: 300,
            sample_interval: 5,
            axes: (0.15, 0.125, 0.4, 0.75),
        }
    }
}

impl PlotOptions {
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width_in * self.dpi as f64).round() as u32,
            (self.height_in * self.dpi as f64).round() as u32,
        )
    }

    fn points_to_pixels(&self, points: f64) -> u32 {
        (points * self.dpi as f64 / POINTS_PER_INCH).round().max(1.0) as u32
    }
}

/// The filled region of one group
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub label: String,
    /// Closed outline: upper edge left to right, then lower edge right to left
    pub points: Vec<(f64, f64)>,
}

// A lone sample is stretched across [0, 1] so it still covers an area
fn sample_positions(n: usize) -> Vec<(f64, usize)> {
    if n == 1 {
        vec![(0.0, 0), (1.0, 0)]
    } else {
        (0..n).map(|i| (i as f64, i)).collect()
    }
}

/// Computes the stacked-area outline of every group.
pub fn area_bands(profile: &StackedProfile) -> Vec<Band> {
    let xs = sample_positions(profile.num_samples());
    profile
        .groups
        .iter()
        .map(|group| {
            let mut points: Vec<(f64, f64)> = xs.iter().map(|&(x, i)| (x, group.upper[i])).collect();
            points.extend(xs.iter().rev().map(|&(x, i)| (x, group.lower[i])));
            Band {
                label: group.label.clone(),
                points,
            }
        })
        .collect()
}

fn plot_err<E: std::fmt::Display>(err: E) -> TaxaplotError {
    TaxaplotError::Plot(err.to_string())
}

fn to_plotters(color: Rgb) -> RGBColor {
    RGBColor(color.red, color.green, color.blue)
}

fn draw_figure<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    bands: &[Band],
    colors: &ColorAssignment,
    num_samples: usize,
    options: &PlotOptions,
) -> Result<()> {
    root.fill(&WHITE).map_err(plot_err)?;

    let (width, height) = root.dim_in_pixel();
    let (left, bottom, axes_w, axes_h) = options.axes;
    let left_px = (left * width as f64).round() as i32;
    let bottom_px = (bottom * height as f64).round() as i32;
    let top_px = ((1.0 - bottom - axes_h) * height as f64).round().max(0.0) as i32;
    let split_px = left_px + (axes_w * width as f64).round() as i32;

    let (axes_area, legend_area) = root.split_horizontally(split_px);

    let label_px = options.points_to_pixels(11.0);
    let desc_px = options.points_to_pixels(13.0);
    let x_max = (num_samples.saturating_sub(1) as f64).max(1.0);
    let interval = options.sample_interval.max(1) as f64;

    let mut chart = ChartBuilder::on(&axes_area)
        .margin_top(top_px)
        .x_label_area_size(bottom_px)
        .y_label_area_size(left_px)
        .build_cartesian_2d((0f64..x_max).step(interval), (0f64..Y_MAX).step(Y_TICK))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(num_samples + 1)
        .x_label_formatter(&|_| String::new())
        .y_labels(5)
        .y_label_formatter(&|y: &f64| format!("{:.2}", y))
        .label_style((FONT, label_px))
        .axis_desc_style((FONT, desc_px))
        .x_desc("Samples")
        .y_desc("Relative Abundance")
        .draw()
        .map_err(plot_err)?;

    for (i, band) in bands.iter().enumerate() {
        let color = colors
            .color(i)
            .map(to_plotters)
            .unwrap_or(RGBColor(128, 128, 128));
        chart
            .draw_series(std::iter::once(Polygon::new(band.points.clone(), color.filled())))
            .map_err(plot_err)?;
    }

    // Legend reads top to bottom in the same order as the stack
    let swatch = options.points_to_pixels(LEGEND_SWATCH_PT) as i32;
    let row_height = (label_px as i32).max(swatch) + swatch / 2;
    let x0 = swatch;
    let mut y = top_px;
    for (i, band) in bands.iter().enumerate().rev() {
        let color = colors
            .color(i)
            .map(to_plotters)
            .unwrap_or(RGBColor(128, 128, 128));
        legend_area
            .draw(&Rectangle::new(
                [(x0, y), (x0 + swatch, y + swatch)],
                color.filled(),
            ))
            .map_err(plot_err)?;
        legend_area
            .draw(&Text::new(
                band.label.clone(),
                (x0 + swatch * 3 / 2, y),
                (FONT, label_px).into_font(),
            ))
            .map_err(plot_err)?;
        y += row_height;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Renders the stacked-area plot with its legend and saves it to `path`.
pub fn plot_area(
    profile: &StackedProfile,
    colors: &ColorAssignment,
    path: &Path,
    options: &PlotOptions,
) -> Result<()> {
    let format = figure_format(path)?;
    let bands = area_bands(profile);
    let size = options.pixel_size();
    debug!(
        "Rendering {} bands over {} samples to {} ({}x{} px)",
        bands.len(),
        profile.num_samples(),
        path.display(),
        size.0,
        size.1
    );

    match format {
        FigureFormat::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_figure(root, &bands, colors, profile.num_samples(), options)
        }
        FigureFormat::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_figure(root, &bands, colors, profile.num_samples(), options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colormap::{define_single_cmap, Colormap};
    use crate::profile::ProfileGroup;

    fn profile(samples: &[&str], groups: &[(&str, &[f64], &[f64])]) -> StackedProfile {
        StackedProfile {
            samples: samples.iter().map(|s| s.to_string()).collect(),
            groups: groups
                .iter()
                .map(|(label, lower, upper)| ProfileGroup {
                    label: label.to_string(),
                    rough: None,
                    mean: 0.0,
                    values: upper.iter().zip(lower.iter()).map(|(u, l)| u - l).collect(),
                    upper: upper.to_vec(),
                    lower: lower.to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_figure_format() {
        assert_eq!(figure_format(Path::new("out.png")).unwrap(), FigureFormat::Png);
        assert_eq!(figure_format(Path::new("out.SVG")).unwrap(), FigureFormat::Svg);
        assert!(matches!(
            figure_format(Path::new("out.pdf")),
            Err(TaxaplotError::UnsupportedFormat(_))
        ));
        assert!(figure_format(Path::new("out")).is_err());
    }

    #[test]
    fn test_default_size_is_8_by_4_inches_at_300_dpi() {
        assert_eq!(PlotOptions::default().pixel_size(), (2400, 1200));
        let options = PlotOptions {
            dpi: 100,
            ..PlotOptions::default()
        };
        assert_eq!(options.pixel_size(), (800, 400));
    }

    #[test]
    fn test_area_bands_outline() {
        let p = profile(
            &["S1", "S2", "S3"],
            &[
                ("a", &[0.0, 0.0, 0.0], &[0.5, 0.4, 0.3]),
                ("b", &[0.5, 0.4, 0.3], &[1.0, 0.9, 0.8]),
            ],
        );
        let bands = area_bands(&p);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[1].label, "b");
        assert_eq!(
            bands[1].points,
            vec![
                (0.0, 1.0),
                (1.0, 0.9),
                (2.0, 0.8),
                (2.0, 0.3),
                (1.0, 0.4),
                (0.0, 0.5)
            ]
        );
    }

    #[test]
    fn test_single_sample_band_has_width() {
        let p = profile(&["S1"], &[("a", &[0.0], &[0.7])]);
        let bands = area_bands(&p);
        assert_eq!(
            bands[0].points,
            vec![(0.0, 0.7), (1.0, 0.7), (1.0, 0.0), (0.0, 0.0)]
        );
    }

    #[test]
    fn test_y_ticks_reach_one() {
        let ticks = (0f64..Y_MAX).step(Y_TICK).key_points(10);
        assert_eq!(ticks.len(), 5);
        assert!((ticks[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_plot_area_writes_png_and_svg() {
        let p = profile(
            &["S1", "S2", "S3"],
            &[
                ("g__u (p__A)", &[0.0, 0.0, 0.0], &[0.5, 0.4, 0.3]),
                ("g__u (p__B)", &[0.5, 0.4, 0.3], &[1.0, 0.9, 0.8]),
            ],
        );
        let map = Colormap::by_name("Set3").unwrap();
        let colors = define_single_cmap(&map, &p.labels());
        let options = PlotOptions {
            dpi: 50,
            ..PlotOptions::default()
        };

        let dir = tempfile::tempdir().unwrap();
        for name in ["area.png", "area.svg"] {
            let path = dir.path().join(name);
            plot_area(&p, &colors, &path, &options).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }

        let svg = std::fs::read_to_string(dir.path().join("area.svg")).unwrap();
        assert!(svg.contains("Relative Abundance"));
        assert!(svg.contains("1.00"));
    }
}
