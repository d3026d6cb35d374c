use super::TransferError;
use serde::{Deserialize, Serialize};

/// Length of a participant identity
pub const ID_LENGTH: usize = 70;
pub const MIN_AMOUNT: u64 = 1_000_000;
pub const MAX_AMOUNT: u64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: String,
    pub destination: String,
    pub amount: u64,
    pub tick: u64,
    pub signature: String,
}

impl TransferRequest {
    /// Parse and validate a JSON object
    pub fn parse(raw: &str) -> Result<Self, TransferError> {
        let request: TransferRequest =
            serde_json::from_str(raw).map_err(|e| TransferError::Validation(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.source.chars().count() != ID_LENGTH {
            return Err(TransferError::Validation(format!(
                "source must be {} characters",
                ID_LENGTH
            )));
        }

        if self.destination.chars().count() != ID_LENGTH {
            return Err(TransferError::Validation(format!(
                "destination must be {} characters",
                ID_LENGTH
            )));
        }

        if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&self.amount) {
            return Err(TransferError::Validation(format!(
                "amount must be within [{}, {}], got {}",
                MIN_AMOUNT, MAX_AMOUNT, self.amount
            )));
        }

        if self.tick == 0 {
            return Err(TransferError::Validation("tick must be positive".to_string()));
        }

        if self.signature.is_empty() {
            return Err(TransferError::Validation("signature cannot be empty".to_string()));
        }

        Ok(())
    }
}
