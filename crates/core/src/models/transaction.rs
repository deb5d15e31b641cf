use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parser::normalize_currency;

/// Type of portfolio transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// A recorded BUY/SELL.
///
/// **Important**: `price_usd` is fixed when the transaction is recorded,
/// from the historical FX rate of `date`. It is never recomputed on read,
/// so cost basis stays stable while live rates move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub portfolio_id: String,
    /// Uppercased ticker
    pub symbol: String,
    /// Always positive; direction comes from `tx_type`
    pub quantity: f64,
    /// Per-unit price in `currency`
    pub price: f64,
    /// Per-unit price in USD at transaction time
    pub price_usd: f64,
    pub date: NaiveDate,
    pub tx_type: TransactionType,
    pub currency: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Everything a user enters for a transaction; `price_usd` is derived
/// when the draft is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub portfolio_id: String,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub date: NaiveDate,
    pub tx_type: TransactionType,
    pub currency: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransactionDraft {
    pub fn new(
        portfolio_id: impl Into<String>,
        symbol: impl Into<String>,
        tx_type: TransactionType,
        quantity: f64,
        price: f64,
        currency: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        // Prices quoted in minor units (pence, cents) are stored in major units.
        let (currency, divisor) = normalize_currency(&currency.into());
        Self {
            portfolio_id: portfolio_id.into(),
            symbol: symbol.into().trim().to_uppercase(),
            quantity,
            price: price / divisor,
            date,
            tx_type,
            currency,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Freeze the draft with its USD unit price.
    pub fn into_transaction(self, price_usd: f64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            portfolio_id: self.portfolio_id,
            symbol: self.symbol,
            quantity: self.quantity,
            price: self.price,
            price_usd,
            date: self.date,
            tx_type: self.tx_type,
            currency: self.currency,
            notes: self.notes,
        }
    }
}

/// Derived aggregation of one symbol's transactions within one portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub portfolio_id: String,
    pub symbol: String,
    /// Σ BUY qty − Σ SELL qty
    pub quantity: f64,
    /// Σ (BUY qty × price_usd). Sells do not reduce it.
    pub cost_usd: f64,
    /// Trading currency of the most recent transaction
    pub currency: String,
}

impl Position {
    /// Average USD cost per unit held: `cost_usd / quantity`.
    pub fn avg_cost_usd(&self) -> Option<f64> {
        if self.quantity > 0.0 {
            Some(self.cost_usd / self.quantity)
        } else {
            None
        }
    }
}

/// All recorded transactions across portfolios, kept sorted by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub transactions: Vec<Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Distinct portfolio ids, sorted.
    pub fn portfolio_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .transactions
            .iter()
            .map(|t| t.portfolio_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
