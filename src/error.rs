use crate::id::{Address, TokenId};
use std::io;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with the market ledger
#[derive(Error, Debug)]
pub enum MarketError {
    /// Caller lacks the capability or ownership the operation requires
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Royalty outside the 0..=10000 basis point range
    #[error("invalid royalty: {0} basis points exceeds 10000")]
    InvalidRoyalty(u16),

    /// Zero or otherwise unrepresentable amount
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Owner balance too small for the requested debit
    #[error("insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: u64, required: u64 },

    /// Owner has not granted approval to the ledger operator
    #[error("approval required for operator {0}")]
    ApprovalRequired(Address),

    /// No listing with the given id
    #[error("listing {0} not found")]
    ListingNotFound(u64),

    /// Listing exists but its inventory was already fully settled or cancelled
    #[error("listing {0} is closed")]
    AlreadyClosed(u64),

    /// Requested units exceed the listing's remaining inventory
    #[error("insufficient inventory: {remaining} remaining, {requested} requested")]
    InsufficientInventory { remaining: u64, requested: u64 },

    /// Tendered payment does not exactly match units * unit price
    #[error("payment mismatch: {tendered} tendered, {required} required")]
    PaymentMismatch { tendered: u64, required: u64 },

    /// Off-chain metadata could not be resolved; degrades the view, never settlement
    #[error("metadata unavailable for token {0}")]
    MetadataUnavailable(TokenId),

    /// Checked arithmetic overflowed
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The payment router refused the transfer batch
    #[error("transfer rejected: {0}")]
    Transfer(String),

    /// IO errors that occur when reading/writing the operation log
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Errors that occur during operation log recording or replay
    #[error("operation log error: {0}")]
    Wal(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

// Additional From conversions for common error types

impl From<bincode::Error> for MarketError {
    fn from(err: bincode::Error) -> Self {
        MarketError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Serialization(err.to_string())
    }
}
