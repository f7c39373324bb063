use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{Address, LoanId, Role};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("loan {loan_id} already exists")]
    LoanAlreadyExists {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} not found")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("adjustment not due for loan {loan_id}: next adjustment at {next_adjustment}, now {now}")]
    AdjustmentNotDue {
        loan_id: LoanId,
        next_adjustment: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("insufficient payment for loan {loan_id}: owed {owed}, provided {provided}")]
    InsufficientPayment {
        loan_id: LoanId,
        owed: Money,
        provided: Money,
    },

    #[error("loan {loan_id} already paid")]
    LoanAlreadyPaid {
        loan_id: LoanId,
    },

    #[error("unauthorized: {caller} is not the {required}")]
    Unauthorized {
        caller: Address,
        required: Role,
    },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid loan terms: {message}")]
    InvalidLoanTerms {
        message: String,
    },

    #[error("invalid price index: {message}")]
    InvalidIndex {
        message: String,
    },

    #[error("invalid service fee rate: {rate} exceeds denominator")]
    InvalidFeeRate {
        rate: u128,
    },

    #[error("arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        operation: &'static str,
    },

    #[error("transfer to {recipient} failed: {message}")]
    TransferFailed {
        recipient: Address,
        message: String,
    },

    #[error("settlement for loan {loan_id} attempted before payment was committed")]
    SettlementNotCommitted {
        loan_id: LoanId,
    },

    #[error("serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
