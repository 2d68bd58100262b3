use thiserror::Error;

#[derive(Debug, Error)]
#[error("oops, my bad: {message}")]
pub struct Bug {
    pub message: String,
    pub source: Option<eyre::Report>,
}
