use chrono::NaiveDate;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::transaction::{
    Ledger, Position, Transaction, TransactionDraft, TransactionType,
};

/// Quantities at or below this are treated as a closed position.
pub const POSITION_EPSILON: f64 = 1e-9;

/// Manages recorded transactions and derives positions from them.
///
/// Pure business logic: no I/O, no API calls. Cost basis comes only from
/// `price_usd` as recorded; quotes never touch transactions.
pub struct PortfolioService;

impl PortfolioService {
    pub fn new() -> Self {
        Self
    }

    /// Add a transaction, keeping the ledger sorted by date.
    /// Validates it first (e.g., can't sell more than the portfolio holds).
    pub fn add_transaction(&self, ledger: &mut Ledger, tx: Transaction) -> Result<(), CoreError> {
        self.validate(
            ledger,
            &tx.portfolio_id,
            &tx.symbol,
            tx.tx_type,
            tx.quantity,
            tx.price,
            tx.date,
        )?;
        Self::binary_insert(&mut ledger.transactions, tx);
        Ok(())
    }

    /// Check a draft before any FX work is spent on it.
    pub fn validate_draft(&self, ledger: &Ledger, draft: &TransactionDraft) -> Result<(), CoreError> {
        if draft.symbol.is_empty() {
            return Err(CoreError::ValidationError("Symbol must not be empty".into()));
        }
        if draft.portfolio_id.trim().is_empty() {
            return Err(CoreError::ValidationError("Portfolio id must not be empty".into()));
        }
        self.validate(
            ledger,
            &draft.portfolio_id,
            &draft.symbol,
            draft.tx_type,
            draft.quantity,
            draft.price,
            draft.date,
        )
    }

    /// Remove a transaction by id. Removing a BUY that later SELLs depend
    /// on is rejected and the ledger is left unchanged.
    pub fn remove_transaction(&self, ledger: &mut Ledger, id: Uuid) -> Result<Transaction, CoreError> {
        let idx = ledger
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;

        let removed = ledger.transactions.remove(idx);
        if removed.tx_type == TransactionType::Buy {
            if let Err(e) = self.validate_consistency(ledger, &removed.portfolio_id, &removed.symbol) {
                Self::binary_insert(&mut ledger.transactions, removed);
                return Err(e);
            }
        }
        Ok(removed)
    }

    /// Transactions of one portfolio (or all), newest first.
    pub fn transactions<'a>(
        &self,
        ledger: &'a Ledger,
        portfolio_id: Option<&str>,
    ) -> Vec<&'a Transaction> {
        let mut txs: Vec<&Transaction> = ledger
            .transactions
            .iter()
            .filter(|t| portfolio_id.map_or(true, |p| t.portfolio_id == p))
            .collect();
        txs.sort_by(|a, b| b.date.cmp(&a.date));
        txs
    }

    /// Quantity of `symbol` held in `portfolio_id` at the end of `date`.
    pub fn held_quantity(
        &self,
        ledger: &Ledger,
        portfolio_id: &str,
        symbol: &str,
        date: NaiveDate,
    ) -> f64 {
        ledger
            .transactions
            .iter()
            .filter(|t| t.portfolio_id == portfolio_id && t.symbol == symbol && t.date <= date)
            .map(|t| match t.tx_type {
                TransactionType::Buy => t.quantity,
                TransactionType::Sell => -t.quantity,
            })
            .sum()
    }

    /// Open positions per portfolio per symbol.
    ///
    /// `quantity = Σ BUY − Σ SELL`, `cost_usd = Σ BUY qty × price_usd`.
    /// Positions at or below `POSITION_EPSILON` are left out.
    pub fn positions(&self, ledger: &Ledger) -> Vec<Position> {
        let mut by_key: BTreeMap<(String, String), Position> = BTreeMap::new();

        for tx in &ledger.transactions {
            let position = by_key
                .entry((tx.portfolio_id.clone(), tx.symbol.clone()))
                .or_insert_with(|| Position {
                    portfolio_id: tx.portfolio_id.clone(),
                    symbol: tx.symbol.clone(),
                    quantity: 0.0,
                    cost_usd: 0.0,
                    currency: tx.currency.clone(),
                });
            match tx.tx_type {
                TransactionType::Buy => {
                    position.quantity += tx.quantity;
                    position.cost_usd += tx.quantity * tx.price_usd;
                }
                TransactionType::Sell => position.quantity -= tx.quantity,
            }
            // Ledger is date-sorted, so the last one seen is the latest.
            position.currency = tx.currency.clone();
        }

        by_key
            .into_values()
            .filter(|p| p.quantity > POSITION_EPSILON)
            .collect()
    }

    /// Open positions of one portfolio.
    pub fn positions_for(&self, ledger: &Ledger, portfolio_id: &str) -> Vec<Position> {
        self.positions(ledger)
            .into_iter()
            .filter(|p| p.portfolio_id == portfolio_id)
            .collect()
    }

    /// Rules:
    /// - Quantity must be positive, price finite and non-negative
    /// - Can't sell more than the portfolio holds on that date
    #[allow(clippy::too_many_arguments)]
    fn validate(
        &self,
        ledger: &Ledger,
        portfolio_id: &str,
        symbol: &str,
        tx_type: TransactionType,
        quantity: f64,
        price: f64,
        date: NaiveDate,
    ) -> Result<(), CoreError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(CoreError::ValidationError(
                "Transaction quantity must be positive".into(),
            ));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(CoreError::ValidationError(
                "Transaction price must be finite and non-negative".into(),
            ));
        }

        if tx_type == TransactionType::Sell {
            let held = self.held_quantity(ledger, portfolio_id, symbol, date);
            if held + POSITION_EPSILON < quantity {
                return Err(CoreError::ValidationError(format!(
                    "Cannot sell {quantity} {symbol}: portfolio {portfolio_id} only holds {held} on {date}"
                )));
            }
        }
        Ok(())
    }

    /// Replay one portfolio's symbol and fail if any SELL exceeds what was
    /// held at that point.
    fn validate_consistency(
        &self,
        ledger: &Ledger,
        portfolio_id: &str,
        symbol: &str,
    ) -> Result<(), CoreError> {
        let mut held = 0.0;
        for tx in ledger
            .transactions
            .iter()
            .filter(|t| t.portfolio_id == portfolio_id && t.symbol == symbol)
        {
            match tx.tx_type {
                TransactionType::Buy => held += tx.quantity,
                TransactionType::Sell => {
                    if held + POSITION_EPSILON < tx.quantity {
                        return Err(CoreError::ValidationError(format!(
                            "Removing this transaction would make the sell of {} {} on {} invalid \
                             (only {:.8} would be held)",
                            tx.quantity, tx.symbol, tx.date, held,
                        )));
                    }
                    held -= tx.quantity;
                }
            }
        }
        Ok(())
    }

    /// Binary insert into a date-sorted Vec<Transaction> in O(log n).
    fn binary_insert(txs: &mut Vec<Transaction>, tx: Transaction) {
        let pos = txs.partition_point(|t| t.date <= tx.date);
        txs.insert(pos, tx);
    }
}

impl Default for PortfolioService {
    fn default() -> Self {
        Self::new()
    }
}
