use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchcovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error at line {line}, column {column}: {source}")]
    Json {
        source: serde_json::Error,
        line: usize,
        column: usize,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown coverage format")]
    UnknownFormat,
}

impl From<serde_json::Error> for PatchcovError {
    fn from(source: serde_json::Error) -> Self {
        let (line, column) = (source.line(), source.column());
        PatchcovError::Json {
            source,
            line,
            column,
        }
    }
}

pub type Result<T> = std::result::Result<T, PatchcovError>;
