use log::warn;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};

use crate::error::{Result, TaxaplotError};

pub type Rgb = Srgb<u8>;

/// Hard cap on the number of groups a plot can tell apart
pub const MAX_COLORS: usize = 12;
pub const FALLBACK_COLORMAP: &str = "Set3";

// ---------------------------------------------------------------------------
// Qualitative maps (ColorBrewer and matplotlib listed colormaps)
// ---------------------------------------------------------------------------

const SET3: &[u32] = &[
    0x8dd3c7, 0xffffb3, 0xbebada, 0xfb8072, 0x80b1d3, 0xfdb462, 0xb3de69, 0xfccde5, 0xd9d9d9,
    0xbc80bd, 0xccebc5, 0xffed6f,
];
const PAIRED: &[u32] = &[
    0xa6cee3, 0x1f78b4, 0xb2df8a, 0x33a02c, 0xfb9a99, 0xe31a1c, 0xfdbf6f, 0xff7f00, 0xcab2d6,
    0x6a3d9a, 0xffff99, 0xb15928,
];
const SET1: &[u32] = &[
    0xe41a1c, 0x377eb8, 0x4daf4a, 0x984ea3, 0xff7f00, 0xffff33, 0xa65628, 0xf781bf, 0x999999,
];
const PASTEL1: &[u32] = &[
    0xfbb4ae, 0xb3cde3, 0xccebc5, 0xdecbe4, 0xfed9a6, 0xffffcc, 0xe5d8bd, 0xfddaec, 0xf2f2f2,
];
const SET2: &[u32] = &[
    0x66c2a5, 0xfc8d62, 0x8da0cb, 0xe78ac3, 0xa6d854, 0xffd92f, 0xe5c494, 0xb3b3b3,
];
const PASTEL2: &[u32] = &[
    0xb3e2cd, 0xfdcdac, 0xcbd5e8, 0xf4cae4, 0xe6f5c9, 0xfff2ae, 0xf1e2cc, 0xcccccc,
];
const DARK2: &[u32] = &[
    0x1b9e77, 0xd95f02, 0x7570b3, 0xe7298a, 0x66a61e, 0xe6ab02, 0xa6761d, 0x666666,
];
const ACCENT: &[u32] = &[
    0x7fc97f, 0xbeaed4, 0xfdc086, 0xffff99, 0x386cb0, 0xf0027f, 0xbf5b17, 0x666666,
];
const TAB10: &[u32] = &[
    0x1f77b4, 0xff7f0e, 0x2ca02c, 0xd62728, 0x9467bd, 0x8c564b, 0xe377c2, 0x7f7f7f, 0xbcbd22,
    0x17becf,
];

const QUALITATIVE: &[(&str, &[u32])] = &[
    ("Set3", SET3),
    ("Paired", PAIRED),
    ("Set1", SET1),
    ("Pastel1", PASTEL1),
    ("Set2", SET2),
    ("Pastel2", PASTEL2),
    ("Dark2", DARK2),
    ("Accent", ACCENT),
    ("tab10", TAB10),
];

const HUES_NAME: &str = "Hues";

// ---------------------------------------------------------------------------
// Sequential families used for joint plots, in assignment order
// ---------------------------------------------------------------------------

const REDS: [u32; 9] = [
    0xfff5f0, 0xfee0d2, 0xfcbba1, 0xfc9272, 0xfb6a4a, 0xef3b2c, 0xcb181d, 0xa50f15, 0x67000d,
];
const BLUES: [u32; 9] = [
    0xf7fbff, 0xdeebf7, 0xc6dbef, 0x9ecae1, 0x6baed6, 0x4292c6, 0x2171b5, 0x08519c, 0x08306b,
];
const GREENS: [u32; 9] = [
    0xf7fcf5, 0xe5f5e0, 0xc7e9c0, 0xa1d99b, 0x74c476, 0x41ab5d, 0x238b45, 0x006d2c, 0x00441b,
];
const PURPLES: [u32; 9] = [
    0xfcfbfd, 0xefedf5, 0xdadaeb, 0xbcbddc, 0x9e9ac8, 0x807dba, 0x6a51a3, 0x54278f, 0x3f007d,
];
const ORANGES: [u32; 9] = [
    0xfff5eb, 0xfee6ce, 0xfdd0a2, 0xfdae6b, 0xfd8d3c, 0xf16913, 0xd94801, 0xa63603, 0x7f2704,
];
const GREYS: [u32; 9] = [
    0xffffff, 0xf0f0f0, 0xd9d9d9, 0xbdbdbd, 0x969696, 0x737373, 0x525252, 0x252525, 0x000000,
];

pub const SEQUENTIAL: &[SequentialMap] = &[
    SequentialMap { name: "Reds", anchors: REDS },
    SequentialMap { name: "Blues", anchors: BLUES },
    SequentialMap { name: "Greens", anchors: GREENS },
    SequentialMap { name: "Purples", anchors: PURPLES },
    SequentialMap { name: "Oranges", anchors: ORANGES },
    SequentialMap { name: "Greys", anchors: GREYS },
];

fn hex(code: u32) -> Rgb {
    Rgb::new((code >> 16) as u8, (code >> 8) as u8, code as u8)
}

pub fn to_hex(color: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_hues(n: usize) -> Vec<Rgb> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            rgb.into_format::<u8>()
        })
        .collect()
}

/// A listed colormap: colour `i` is entry `i`, clamped to the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    name: String,
    colors: Vec<Rgb>,
}

impl Colormap {
    /// Looks up a colormap by its matplotlib name; `_r` reverses it.
    pub fn by_name(name: &str) -> Result<Self> {
        let (base, reversed) = match name.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (name, false),
        };

        let mut colors = if base == HUES_NAME {
            generate_hues(MAX_COLORS)
        } else {
            QUALITATIVE
                .iter()
                .find(|(n, _)| *n == base)
                .map(|(_, codes)| codes.iter().copied().map(hex).collect::<Vec<_>>())
                .ok_or_else(|| TaxaplotError::UnknownColormap {
                    name: name.to_string(),
                    known: known_colormaps().join(", "),
                })?
        };

        if reversed {
            colors.reverse();
        }
        Ok(Self {
            name: name.to_string(),
            colors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct colours the map provides.
    pub fn capacity(&self) -> usize {
        self.colors.len()
    }

    pub fn color(&self, index: usize) -> Rgb {
        let last = self.colors.len().saturating_sub(1);
        self.colors[index.min(last)]
    }
}

pub fn known_colormaps() -> Vec<String> {
    QUALITATIVE
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once(HUES_NAME))
        .flat_map(|name| [name.to_string(), format!("{}_r", name)])
        .collect()
}

/// A sequential ramp sampled on matplotlib's 0-255 index scale.
#[derive(Debug, Clone, Copy)]
pub struct SequentialMap {
    pub name: &'static str,
    anchors: [u32; 9],
}

impl SequentialMap {
    pub fn at(&self, index: usize) -> Rgb {
        let t = index.min(255) as f32 / 255.0;
        let scaled = t * (self.anchors.len() - 1) as f32;
        let lo = (scaled.floor() as usize).min(self.anchors.len() - 2);
        let frac = scaled - lo as f32;

        let a: LinSrgb = hex(self.anchors[lo]).into_format::<f32>().into_linear();
        let b: LinSrgb = hex(self.anchors[lo + 1]).into_format::<f32>().into_linear();
        let mixed: Srgb = Srgb::from_linear(a.mix(b, frac));
        mixed.into_format::<u8>()
    }
}

/// Checks the requested group count against the colormap.
///
/// More than [`MAX_COLORS`] groups is an error. A map with fewer colours than
/// groups is swapped for Set3.
pub fn check_group_capacity(group_thresh: usize, colormap: &str) -> Result<Colormap> {
    if group_thresh > MAX_COLORS {
        return Err(TaxaplotError::TooManyGroups {
            requested: group_thresh,
            max: MAX_COLORS,
        });
    }

    let map = Colormap::by_name(colormap)?;
    if group_thresh > map.capacity() {
        warn!(
            "There are too many colors for the {} colormap ({} groups, {} colors). Changing to {}.",
            map.name(),
            group_thresh,
            map.capacity(),
            FALLBACK_COLORMAP
        );
        return Colormap::by_name(FALLBACK_COLORMAP);
    }
    Ok(map)
}

/// Colours assigned to the display groups, in plotting order.
///
/// Lookups go by group position so groups sharing a label keep their own colour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorAssignment {
    entries: Vec<(String, Rgb)>,
}

impl ColorAssignment {
    pub fn color(&self, index: usize) -> Option<Rgb> {
        self.entries.get(index).map(|(_, c)| *c)
    }

    pub fn entries(&self) -> &[(String, Rgb)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Gets the colormap for a single-level plot.
pub fn define_single_cmap<S: AsRef<str>>(map: &Colormap, labels: &[S]) -> ColorAssignment {
    ColorAssignment {
        entries: labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_ref().to_string(), map.color(i)))
            .collect(),
    }
}

/// Defines a joint colormap from `(rough, fine)` group labels.
///
/// Each rough group gets its own sequential family; the fine groups inside it
/// step from mid-dark towards light.
pub fn define_joint_cmap<S: AsRef<str>>(groups: &[(S, S)]) -> Result<ColorAssignment> {
    let mut rough_order: Vec<&str> = Vec::new();
    let mut within: Vec<usize> = Vec::new();
    let mut entries = Vec::with_capacity(groups.len());

    for (rough, fine) in groups {
        let rough = rough.as_ref();
        let r = match rough_order.iter().position(|g| *g == rough) {
            Some(r) => r,
            None => {
                rough_order.push(rough);
                within.push(0);
                rough_order.len() - 1
            }
        };

        let family = SEQUENTIAL.get(r).ok_or_else(|| {
            TaxaplotError::InvalidArgument(format!(
                "at most {} rough groups can be colored",
                SEQUENTIAL.len()
            ))
        })?;
        within[r] += 1;
        let index = 200usize.saturating_sub(within[r] * 20);
        entries.push((fine.as_ref().to_string(), family.at(index)));
    }

    Ok(ColorAssignment { entries })
}
