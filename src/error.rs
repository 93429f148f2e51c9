use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GseaError>;

/// Reasons an input file, a numeric parameter or a plot argument is rejected.
///
/// Messages are written for end users: they are printed verbatim as the single
/// line a failing invocation emits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("The {class} file ({allowed}) is not of the right type.")]
    WrongExtension {
        class: &'static str,
        allowed: String,
    },
    #[error("The {class} file is malformed and cannot be interpreted: {detail}")]
    Unparsable { class: &'static str, detail: String },
    #[error("The {class} file has some missing values and cannot be used.")]
    MissingValues { class: &'static str },
    #[error("The {class} file has some non-numerical values and cannot be used.")]
    NonNumeric { class: &'static str },
    #[error("{0}")]
    InvalidParameter(String),
    #[error("Term '{0}' is not present in the saved analysis.")]
    UnknownTerm(String),
    #[error("Column '{0}' cannot be used for this plot.")]
    UnknownColumn(String),
    #[error("Malformed plot argument: {0}")]
    MalformedArgument(String),
}

/// Why a checkpoint could not be restored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorruptKind {
    #[error("unreadable checkpoint data ({0})")]
    UnreadableBytes(String),
    #[error("checkpoint schema version {found} is not supported (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
}

#[derive(Error, Debug)]
pub enum GseaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Configuration(String),
    #[error("GSEA failed while computing the analysis: {0}")]
    Engine(String),
    #[error("No saved analysis found at {}; run an analysis first.", .0.display())]
    CheckpointMissing(PathBuf),
    #[error("The saved analysis cannot be restored: {0}")]
    CheckpointCorrupt(CorruptKind),
    #[error("Requested size {width:.2}x{height:.2} {unit} exceeds the maximum of {limit} {unit}.")]
    SizeLimit {
        width: f64,
        height: f64,
        limit: f64,
        unit: &'static str,
    },
    #[error("Error: requested plot '{0}' doesn't exist")]
    UnsupportedPlotKind(String),
    #[error("Rendering failed: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GseaError {
    /// Process exit status for this failure. Every failure is terminal.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl From<csv::Error> for GseaError {
    fn from(e: csv::Error) -> Self {
        GseaError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl From<serde_json::Error> for GseaError {
    fn from(e: serde_json::Error) -> Self {
        ValidationError::MalformedArgument(e.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_single_line() {
        let e: GseaError = ValidationError::MissingValues {
            class: "expression set",
        }
        .into();
        let msg = e.to_string();
        assert!(!msg.contains('\n'));
        assert_eq!(
            msg,
            "The expression set file has some missing values and cannot be used."
        );
        assert_eq!(e.exit_code(), 1);
    }
}
