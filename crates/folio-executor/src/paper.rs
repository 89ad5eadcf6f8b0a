//! In-process paper broker.
//!
//! Accepts every well-formed order into an in-memory book with generated
//! order ids. Nothing ever fills; orders stay cancelable until cancelled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use folio_core::{BoxFuture, CancelRequest, CancelableOrder, OrderMessage};
use parking_lot::Mutex;
use tracing::info;

use crate::broker_api::{BrokerApi, Submission};
use crate::error::SubmitError;

const PAPER_ROUTING: &str = "PAPER";

/// Paper trading broker.
#[derive(Debug, Default)]
pub struct PaperBroker {
    next_id: AtomicU64,
    book: Mutex<BTreeMap<String, CancelableOrder>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_orders(&self) -> usize {
        self.book.lock().len()
    }
}

impl BrokerApi for PaperBroker {
    fn submit<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Result<Submission, SubmitError>> {
        Box::pin(async move {
            if order.quantity == 0 {
                return Err(SubmitError::Business("Order quantity must be positive".to_string()));
            }
            if order.ticker.is_empty() {
                return Err(SubmitError::Business("Ticker is required".to_string()));
            }

            let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let broker_order_id = format!("P{seq:09}");
            self.book.lock().insert(
                broker_order_id.clone(),
                CancelableOrder {
                    broker_order_id: broker_order_id.clone(),
                    routing_reference: PAPER_ROUTING.to_string(),
                    ticker: order.ticker.clone(),
                    kind: Some(order.kind),
                    ordered_quantity: order.quantity,
                    cancelable_quantity: order.quantity,
                    price: order.limit_price,
                },
            );
            info!(%broker_order_id, ticker = %order.ticker, quantity = order.quantity, "Paper order booked");

            Ok(Submission {
                broker_order_id,
                routing_reference: PAPER_ROUTING.to_string(),
                message: "Paper order accepted".to_string(),
            })
        })
    }

    fn cancel<'a>(&'a self, request: &'a CancelRequest) -> BoxFuture<'a, Result<String, SubmitError>> {
        Box::pin(async move {
            let mut book = self.book.lock();
            let Some(entry) = book.get_mut(&request.broker_order_id) else {
                return Err(SubmitError::Business(format!(
                    "No cancelable order {}",
                    request.broker_order_id
                )));
            };

            if request.cancel_all || request.quantity >= entry.cancelable_quantity {
                book.remove(&request.broker_order_id);
                Ok("Order cancelled".to_string())
            } else {
                entry.cancelable_quantity -= request.quantity;
                Ok(format!("Cancelled {} of order", request.quantity))
            }
        })
    }

    fn cancelable_orders(&self) -> BoxFuture<'_, Result<Vec<CancelableOrder>, SubmitError>> {
        Box::pin(async move { Ok(self.book.lock().values().cloned().collect()) })
    }

    fn is_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::OrderSide;

    #[tokio::test]
    async fn test_book_and_cancel() {
        let broker = PaperBroker::new();
        let order = OrderMessage::market(OrderSide::Buy, "005930", 10);

        let submission = broker.submit(&order).await.unwrap();
        assert_eq!(submission.broker_order_id, "P000000001");
        assert_eq!(broker.cancelable_orders().await.unwrap().len(), 1);

        // Partial cancel keeps the order open
        let partial = CancelRequest {
            broker_order_id: submission.broker_order_id.clone(),
            routing_reference: PAPER_ROUTING.to_string(),
            quantity: 4,
            cancel_all: false,
        };
        broker.cancel(&partial).await.unwrap();
        let open = broker.cancelable_orders().await.unwrap();
        assert_eq!(open[0].cancelable_quantity, 6);

        let full = CancelRequest {
            cancel_all: true,
            ..partial
        };
        broker.cancel(&full).await.unwrap();
        assert_eq!(broker.open_orders(), 0);
        assert!(matches!(broker.cancel(&full).await, Err(SubmitError::Business(_))));
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let broker = PaperBroker::new();
        let order = OrderMessage::market(OrderSide::Sell, "005930", 0);
        assert!(matches!(broker.submit(&order).await, Err(SubmitError::Business(_))));
    }
}
