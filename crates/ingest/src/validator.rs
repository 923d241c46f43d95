//! Row validation: one spreadsheet row in, one offer (or a rejection) out.
//!
//! Expected columns, left to right: offer id, name, price, quantity,
//! availability. Cells past the fifth are ignored; missing cells count
//! as empty. Validation is pure and deterministic.

use calamine::Data;
use offers_core::{CandidateOffer, OfferId, SellerId};
use thiserror::Error;

/// Number of leading columns the validator looks at.
pub const COLUMN_COUNT: usize = 5;

const COL_OFFER_ID: usize = 0;
const COL_NAME: usize = 1;
const COL_PRICE: usize = 2;
const COL_QUANTITY: usize = 3;
const COL_AVAILABLE: usize = 4;

const AVAILABLE_TRUE: &str = "true";
const AVAILABLE_FALSE: &str = "false";

/// Why a row was rejected. Only used for debug logging; callers count
/// every rejection the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("offer id is not an integer")]
    OfferId,
    #[error("name is empty")]
    Name,
    #[error("price is not a non-negative integer")]
    Price,
    #[error("quantity is not a positive integer")]
    Quantity,
    #[error("availability is neither \"true\" nor \"false\"")]
    Availability,
}

/// A row that passed validation but is not yet tied to a seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRow {
    pub offer_id: OfferId,
    pub name: String,
    pub price: u64,
    pub quantity: u64,
    pub available: bool,
}

impl ValidRow {
    pub fn for_seller(self, seller_id: SellerId) -> CandidateOffer {
        CandidateOffer {
            offer_id: self.offer_id,
            name: self.name,
            price: self.price,
            quantity: self.quantity,
            available: self.available,
            seller_id,
        }
    }
}

/// Validate one row.
pub fn validate_row(row: &[Data]) -> Result<ValidRow, RowRejection> {
    let offer_id = cell_int(cell(row, COL_OFFER_ID)).ok_or(RowRejection::OfferId)?;

    let name = cell(row, COL_NAME).to_string();
    if name.is_empty() {
        return Err(RowRejection::Name);
    }

    let price = cell_int(cell(row, COL_PRICE))
        .and_then(|v| u64::try_from(v).ok())
        .ok_or(RowRejection::Price)?;

    let quantity = cell_int(cell(row, COL_QUANTITY))
        .and_then(|v| u64::try_from(v).ok())
        .filter(|&v| v > 0)
        .ok_or(RowRejection::Quantity)?;

    let available = cell_bool(cell(row, COL_AVAILABLE)).ok_or(RowRejection::Availability)?;

    Ok(ValidRow {
        offer_id,
        name,
        price,
        quantity,
        available,
    })
}

fn cell(row: &[Data], index: usize) -> &Data {
    row.get(index).unwrap_or(&Data::Empty)
}

/// Integer cells: native ints, whole floats (how xlsx stores numbers),
/// or text holding a plain integer.
fn cell_int(data: &Data) -> Option<i64> {
    match data {
        Data::Int(v) => Some(*v),
        Data::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Some(*f as i64)
            } else {
                None
            }
        }
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_bool(data: &Data) -> Option<bool> {
    match data {
        Data::Bool(b) => Some(*b),
        Data::String(s) if s == AVAILABLE_TRUE => Some(true),
        Data::String(s) if s == AVAILABLE_FALSE => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    fn good_row() -> Vec<Data> {
        vec![
            Data::Float(5.0),
            text("Unicycle V5 black"),
            Data::Float(5000.0),
            Data::Float(9.0),
            text("true"),
        ]
    }

    fn with_cell(index: usize, value: Data) -> Vec<Data> {
        let mut row = good_row();
        row[index] = value;
        row
    }

    #[test]
    fn test_valid_row() {
        let row = validate_row(&good_row()).unwrap();
        assert_eq!(row.offer_id, 5);
        assert_eq!(row.name, "Unicycle V5 black");
        assert_eq!(row.price, 5000);
        assert_eq!(row.quantity, 9);
        assert!(row.available);

        let offer = row.for_seller(3);
        assert_eq!(offer.seller_id, 3);
        assert_eq!(offer.offer_id, 5);
    }

    #[test]
    fn test_integer_encodings_accepted() {
        let row = vec![
            Data::Int(1),
            Data::Float(42.0),
            text(" 0 "),
            text("12"),
            text("false"),
        ];
        let valid = validate_row(&row).unwrap();
        assert_eq!(valid.offer_id, 1);
        assert_eq!(valid.name, "42");
        assert_eq!(valid.price, 0);
        assert_eq!(valid.quantity, 12);
        assert!(!valid.available);
    }

    #[test]
    fn test_offer_id_rejections() {
        for bad in [text("abc"), Data::Float(1.5), Data::Empty, Data::Bool(true)] {
            assert_eq!(validate_row(&with_cell(0, bad)), Err(RowRejection::OfferId));
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(validate_row(&with_cell(1, text(""))), Err(RowRejection::Name));
        assert_eq!(validate_row(&with_cell(1, Data::Empty)), Err(RowRejection::Name));
    }

    #[test]
    fn test_price_rejections() {
        assert_eq!(validate_row(&with_cell(2, text("cheap"))), Err(RowRejection::Price));
        assert_eq!(validate_row(&with_cell(2, Data::Float(-1.0))), Err(RowRejection::Price));
        assert_eq!(validate_row(&with_cell(2, Data::Float(9.99))), Err(RowRejection::Price));
        assert!(validate_row(&with_cell(2, Data::Float(0.0))).is_ok());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert_eq!(validate_row(&with_cell(3, Data::Float(0.0))), Err(RowRejection::Quantity));
        assert_eq!(validate_row(&with_cell(3, Data::Int(-4))), Err(RowRejection::Quantity));
        assert_eq!(validate_row(&with_cell(3, text("many"))), Err(RowRejection::Quantity));
    }

    #[test]
    fn test_availability_tokens() {
        assert_eq!(validate_row(&with_cell(4, text("TRUE"))), Err(RowRejection::Availability));
        assert_eq!(validate_row(&with_cell(4, text("yes"))), Err(RowRejection::Availability));
        assert_eq!(validate_row(&with_cell(4, Data::Empty)), Err(RowRejection::Availability));
        assert!(!validate_row(&with_cell(4, Data::Bool(false))).unwrap().available);
    }

    #[test]
    fn test_short_row_rejected() {
        let row = vec![Data::Float(1.0), text("Pencil")];
        assert_eq!(validate_row(&row), Err(RowRejection::Price));
        assert_eq!(validate_row(&[]), Err(RowRejection::OfferId));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let mut row = good_row();
        row.push(text("note"));
        assert!(validate_row(&row).is_ok());
    }

    #[test]
    fn test_idempotent() {
        let row = with_cell(2, text("oops"));
        assert_eq!(validate_row(&row), validate_row(&row));
        assert_eq!(validate_row(&good_row()), validate_row(&good_row()));
    }
}
