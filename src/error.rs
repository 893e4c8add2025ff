use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxaplotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Column '{0}' not found in table header")]
    MissingColumn(String),

    #[error("Samples not found in table: {}", .0.join(", "))]
    MissingSamples(Vec<String>),

    #[error("Invalid taxonomic level '{0}' (use an index or one of kingdom, phylum, class, order, family, genus, species)")]
    InvalidLevel(String),

    #[error("Unknown colormap '{name}'. Known colormaps: {known}")]
    UnknownColormap { name: String, known: String },

    #[error("You may display at most {max} colors on this plot (requested {requested}). Please re-consider your plotting choices.")]
    TooManyGroups { requested: usize, max: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported figure format '{0}' (use .png or .svg)")]
    UnsupportedFormat(String),

    #[error("No taxa passed the abundance threshold {threshold} at level {level}")]
    EmptyProfile { level: usize, threshold: f64 },

    #[error("Plotting error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, TaxaplotError>;
