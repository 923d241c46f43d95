use thiserror::Error;

#[derive(Error, Debug)]
pub enum OffersError {
    #[error("invalid task status: {0}")]
    InvalidStatus(String),

    #[error("seller name must start with a Latin or Cyrillic letter, got {0:?}")]
    InvalidSellerName(String),

    #[error("configuration error: {0}")]
    Config(String),
}
