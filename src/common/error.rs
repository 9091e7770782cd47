use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceBankError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Identifier already registered: {0}")]
    DuplicateIdentifier(String),

    #[error("Corrupt descriptor: {0}")]
    CorruptDescriptor(String),

    #[error("Descriptor extraction timed out after {0}ms")]
    ExtractionTimeout(u64),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Balance overflow: {0}")]
    BalanceOverflow(String),

    #[error("Transfer source and destination are the same account")]
    SelfTransfer,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceBankError>;
