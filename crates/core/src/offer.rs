use serde::{Deserialize, Serialize};

use crate::error::OffersError;

/// Seller identifier, assigned by the store.
pub type SellerId = i64;

/// Seller-scoped offer identifier, taken verbatim from the uploaded sheet.
pub type OfferId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub seller_id: SellerId,
    pub seller_name: String,
}

impl Seller {
    /// Seller names are non-empty and start with a Latin or Cyrillic letter.
    pub fn validate_name(name: &str) -> Result<(), OffersError> {
        match name.chars().next() {
            Some(c) if c.is_ascii_alphabetic() || matches!(c, 'а'..='я' | 'А'..='Я') => Ok(()),
            _ => Err(OffersError::InvalidSellerName(name.to_string())),
        }
    }
}

/// A validated spreadsheet row waiting to be applied to the seller's catalog.
///
/// Never persisted on its own; it only travels inside the batch handed to
/// the persistence gateway. `available = false` means "remove this offer".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOffer {
    pub offer_id: OfferId,
    pub name: String,
    pub price: u64,
    pub quantity: u64,
    pub available: bool,
    pub seller_id: SellerId,
}

/// Breakdown computed by the store when a batch is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub num_created: u64,
    pub num_updated: u64,
    pub num_deleted: u64,
}
