use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("entity has no title")]
    MissingTitle,

    #[error("{field} = {value} is outside the rating scale {min}..={max}")]
    OutOfScale {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

