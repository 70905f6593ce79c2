//! Human-readable identifiers for clients, contracts and installments.
//!
//! Installment ids are derived from the contract id and the sequence number, so
//! they are stable across regenerations of the same schedule. Client and contract
//! ids are sequential; the caller supplies the last issued id.

use crate::errors::{EngineError, Result};

const CLIENT_PREFIX: &str = "CLT";
const CONTRACT_PREFIX: &str = "CTR";

/// `{contract_id}-{seq:03}`
pub fn installment_id(contract_id: &str, sequence_number: u32) -> String {
    format!("{}-{:03}", contract_id, sequence_number)
}

/// next client id after `last` (`CLT-0001`, `CLT-0002`, ...)
pub fn next_client_id(last: Option<&str>) -> Result<String> {
    let next = match last {
        None => 1,
        Some(last) => trailing_number(last)? + 1,
    };
    Ok(format!("{}-{:04}", CLIENT_PREFIX, next))
}

/// next contract id for `year` after `last` issued in that year (`CTR-2024-0001`, ...)
pub fn next_contract_id(year: i32, last: Option<&str>) -> Result<String> {
    let next = match last {
        None => 1,
        Some(last) => {
            let mut parts = last.split('-');
            let issued_year = parts.nth(1).and_then(|y| y.parse::<i32>().ok());
            if issued_year != Some(year) {
                1
            } else {
                trailing_number(last)? + 1
            }
        }
    };
    Ok(format!("{}-{}-{:04}", CONTRACT_PREFIX, year, next))
}

fn trailing_number(id: &str) -> Result<u32> {
    id.rsplit('-')
        .next()
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| EngineError::Validation {
            message: format!("identifier '{}' has no numeric suffix", id),
        })
}
