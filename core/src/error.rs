use crate::ledger::ValidationFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GachaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Probability configuration is broken: {0}")]
    ProbabilityConfig(#[from] ValidationFailure),

    #[error("Packet '{packet_id}' not found")]
    PacketNotFound { packet_id: String },

    #[error("Packet '{packet_id}' is not on sale")]
    PacketInactive { packet_id: String },

    #[error("Invalid quantity {quantity}: must be between 1 and {max}")]
    InvalidQuantity { quantity: u32, max: u32 },

    #[error("Insufficient {currency}: need {required}, have {available}")]
    InsufficientFunds {
        currency: String,
        required: i64,
        available: i64,
    },

    #[error("Reward delivery failed for purchase {purchase_id}: {reason} (refunded: {refunded})")]
    Delivery {
        purchase_id: String,
        reason: String,
        refunded: bool,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GachaError {
    /// Status code the HTTP layer answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ProbabilityConfig(_) => 409,
            Self::PacketNotFound { .. } => 404,
            Self::PacketInactive { .. } => 409,
            Self::InvalidQuantity { .. } => 400,
            Self::InsufficientFunds { .. } => 402,
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Delivery { .. }
            | Self::Other(_) => 500,
        }
    }

    /// True when the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

pub type GachaResult<T> = Result<T, GachaError>;
