//! In-memory paper trading.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};

use tradegraph_core::error::{Result, TradegraphError};
use tradegraph_core::traits::Broker;
use tradegraph_core::types::{Decision, Order, OrderReceipt};

#[derive(Debug)]
struct Account {
    cash: f64,
    positions: BTreeMap<String, u32>,
    quotes: HashMap<String, f64>,
}

/// A [`Broker`] that fills every valid order immediately.
///
/// Limit orders fill at their limit price; market orders (price 0) fill at
/// the last quote set for the ticker, or at zero cost when none is known.
/// Buys need enough cash and sells need enough shares.
#[derive(Debug)]
pub struct PaperBroker {
    account: Mutex<Account>,
}

impl PaperBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            account: Mutex::new(Account {
                cash,
                positions: BTreeMap::new(),
                quotes: HashMap::new(),
            }),
        }
    }

    fn account(&self) -> Result<std::sync::MutexGuard<'_, Account>> {
        self.account
            .lock()
            .map_err(|_| TradegraphError::Broker("paper account lock poisoned".into()))
    }

    pub fn set_quote(&self, ticker: &str, price: f64) -> Result<()> {
        self.account()?.quotes.insert(ticker.to_string(), price);
        Ok(())
    }

    pub fn cash(&self) -> Result<f64> {
        Ok(self.account()?.cash)
    }

    pub fn position(&self, ticker: &str) -> Result<u32> {
        Ok(self.account()?.positions.get(ticker).copied().unwrap_or(0))
    }

    pub fn positions(&self) -> Result<BTreeMap<String, u32>> {
        Ok(self.account()?.positions.clone())
    }
}

impl Broker for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    fn place_order(&self, order: &Order) -> Result<OrderReceipt> {
        if order.quantity == 0 {
            return Err(TradegraphError::Broker("order quantity must be positive".into()));
        }
        let mut account = self.account()?;

        let price = if order.price > 0.0 {
            order.price
        } else {
            account.quotes.get(&order.ticker).copied().unwrap_or_else(|| {
                debug!(ticker = %order.ticker, "No quote for market order, filling at zero");
                0.0
            })
        };
        let notional = price * f64::from(order.quantity);

        match order.decision {
            Decision::Buy => {
                if notional > account.cash {
                    return Err(TradegraphError::Broker(format!(
                        "insufficient cash for {} x{}: need {:.2}, have {:.2}",
                        order.ticker, order.quantity, notional, account.cash
                    )));
                }
                account.cash -= notional;
                *account.positions.entry(order.ticker.clone()).or_insert(0) += order.quantity;
            }
            Decision::Sell => {
                let held = account.positions.get(&order.ticker).copied().unwrap_or(0);
                if held < order.quantity {
                    return Err(TradegraphError::Broker(format!(
                        "cannot sell {} x{}: holding {}",
                        order.ticker, order.quantity, held
                    )));
                }
                account.cash += notional;
                if held == order.quantity {
                    account.positions.remove(&order.ticker);
                } else {
                    account.positions.insert(order.ticker.clone(), held - order.quantity);
                }
            }
            Decision::Hold => {
                return Err(TradegraphError::Broker("HOLD is not an order".into()));
            }
        }

        let receipt = OrderReceipt {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
            order: order.clone(),
            filled_price: price,
            timestamp: Utc::now(),
        };
        info!(
            ticker = %order.ticker,
            decision = %order.decision,
            quantity = order.quantity,
            price,
            cash = account.cash,
            "Paper order filled"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ticker: &str, decision: Decision, quantity: u32, price: f64) -> Order {
        Order {
            ticker: ticker.into(),
            decision,
            quantity,
            price,
        }
    }

    #[test]
    fn test_buy_then_sell() {
        let broker = PaperBroker::new(1000.0);
        let receipt = broker.place_order(&order("AAPL", Decision::Buy, 5, 100.0)).unwrap();
        assert!(receipt.order_id.starts_with("paper-"));
        assert_eq!(receipt.filled_price, 100.0);
        assert_eq!(broker.cash().unwrap(), 500.0);
        assert_eq!(broker.position("AAPL").unwrap(), 5);

        broker.place_order(&order("AAPL", Decision::Sell, 5, 120.0)).unwrap();
        assert_eq!(broker.cash().unwrap(), 1100.0);
        assert_eq!(broker.position("AAPL").unwrap(), 0);
        assert!(broker.positions().unwrap().is_empty());
    }

    #[test]
    fn test_sell_unheld_rejected() {
        let broker = PaperBroker::new(1000.0);
        let err = broker.place_order(&order("MSFT", Decision::Sell, 1, 10.0)).unwrap_err();
        assert!(matches!(err, TradegraphError::Broker(_)));
        assert_eq!(broker.cash().unwrap(), 1000.0);
    }

    #[test]
    fn test_insufficient_cash_rejected() {
        let broker = PaperBroker::new(50.0);
        assert!(broker.place_order(&order("AAPL", Decision::Buy, 1, 100.0)).is_err());
        assert_eq!(broker.position("AAPL").unwrap(), 0);
    }

    #[test]
    fn test_market_order_uses_quote() {
        let broker = PaperBroker::new(1000.0);
        broker.set_quote("NVDA", 40.0).unwrap();
        let receipt = broker.place_order(&order("NVDA", Decision::Buy, 2, 0.0)).unwrap();
        assert_eq!(receipt.filled_price, 40.0);
        assert_eq!(broker.cash().unwrap(), 920.0);

        let receipt = broker.place_order(&order("TSLA", Decision::Buy, 1, 0.0)).unwrap();
        assert_eq!(receipt.filled_price, 0.0);
    }

    #[test]
    fn test_hold_and_zero_quantity_rejected() {
        let broker = PaperBroker::new(1000.0);
        assert!(broker.place_order(&order("AAPL", Decision::Hold, 1, 1.0)).is_err());
        assert!(broker.place_order(&order("AAPL", Decision::Buy, 0, 1.0)).is_err());
    }
}
