//! Live brokerage transaction client.
//!
//! Order-cash submission, cancel-or-revise and the cancelable-order inquiry
//! on the brokerage REST API.

use std::sync::Arc;

use folio_broker::client::{field_decimal, field_str, field_u64};
use folio_broker::BrokerClient;
use folio_core::{BoxFuture, CancelRequest, CancelableOrder, OrderMessage, OrderSide, OrderStyle};
use serde_json::{json, Value};
use tracing::debug;

use crate::broker_api::{BrokerApi, Submission};
use crate::error::SubmitError;

const ORDER_CASH_PATH: &str = "/uapi/domestic-stock/v1/trading/order-cash";
const CANCEL_PATH: &str = "/uapi/domestic-stock/v1/trading/order-rvsecncl";
const CANCELABLE_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-psbl-rvsecncl";

const TR_BUY: &str = "TTTC0012U";
const TR_SELL: &str = "TTTC0011U";
const TR_CANCEL: &str = "TTTC0013U";
const TR_CANCELABLE: &str = "TTTC0084R";

/// Order division code: `01` market, `00` limit.
fn division(style: OrderStyle) -> &'static str {
    match style {
        OrderStyle::Market => "01",
        OrderStyle::Limit => "00",
    }
}

/// Order-cash request body.
pub fn order_body(account: [(&'static str, String); 2], order: &OrderMessage) -> Value {
    let unit_price = match order.order_style {
        OrderStyle::Market => "0".to_string(),
        OrderStyle::Limit => order.limit_price.normalize().to_string(),
    };
    let mut body = json!({
        "PDNO": order.ticker,
        "ORD_DVSN": division(order.order_style),
        "ORD_QTY": order.quantity.to_string(),
        "ORD_UNPR": unit_price,
    });
    for (key, value) in account {
        body[key] = Value::String(value);
    }
    body
}

/// Cancel-or-revise request body (revision code `02` = cancel).
pub fn cancel_body(account: [(&'static str, String); 2], request: &CancelRequest) -> Value {
    let mut body = json!({
        "KRX_FWDG_ORD_ORGNO": request.routing_reference,
        "ORGN_ODNO": request.broker_order_id,
        "ORD_DVSN": "00",
        "RVSE_CNCL_DVSN_CD": "02",
        "ORD_QTY": request.quantity.to_string(),
        "ORD_UNPR": "0",
        "QTY_ALL_ORD_YN": if request.cancel_all { "Y" } else { "N" },
    });
    for (key, value) in account {
        body[key] = Value::String(value);
    }
    body
}

/// Map one cancelable-order inquiry row.
pub fn parse_cancelable(item: &Value) -> CancelableOrder {
    let kind = match field_str(item, "sll_buy_dvsn_cd") {
        "01" => Some(OrderSide::Sell),
        "02" => Some(OrderSide::Buy),
        _ => None,
    };
    CancelableOrder {
        broker_order_id: field_str(item, "odno").to_string(),
        routing_reference: field_str(item, "ord_gno_brno").to_string(),
        ticker: field_str(item, "pdno").to_string(),
        kind,
        ordered_quantity: field_u64(item, "ord_qty"),
        cancelable_quantity: field_u64(item, "psbl_qty"),
        price: field_decimal(item, "ord_unpr"),
    }
}

/// Brokerage transaction API.
pub struct LiveBroker {
    client: Arc<BrokerClient>,
}

impl LiveBroker {
    pub fn new(client: Arc<BrokerClient>) -> Self {
        Self { client }
    }

    async fn submit_order(&self, order: &OrderMessage) -> Result<Submission, SubmitError> {
        let tr_id = match order.kind {
            OrderSide::Buy => TR_BUY,
            OrderSide::Sell => TR_SELL,
        };
        let body = order_body(self.client.account_fields(), order);
        let response = self.client.post(ORDER_CASH_PATH, tr_id, &body).await?;

        let output = response.get("output").cloned().unwrap_or(Value::Null);
        let broker_order_id = field_str(&output, "ODNO").to_string();
        if broker_order_id.is_empty() {
            return Err(SubmitError::Business("Broker response missing order number".to_string()));
        }
        debug!(%broker_order_id, request_id = %order.request_id, "Order-cash accepted");

        Ok(Submission {
            broker_order_id,
            routing_reference: field_str(&output, "KRX_FWDG_ORD_ORGNO").to_string(),
            message: field_str(&response, "msg1").trim().to_string(),
        })
    }

    async fn cancel_order(&self, request: &CancelRequest) -> Result<String, SubmitError> {
        let body = cancel_body(self.client.account_fields(), request);
        let response = self.client.post(CANCEL_PATH, TR_CANCEL, &body).await?;
        Ok(field_str(&response, "msg1").trim().to_string())
    }

    async fn list_cancelable(&self) -> Result<Vec<CancelableOrder>, SubmitError> {
        let mut params: Vec<(&str, String)> = self.client.account_fields().into_iter().collect();
        params.extend([
            ("CTX_AREA_FK100", String::new()),
            ("CTX_AREA_NK100", String::new()),
            ("INQR_DVSN_1", "0".to_string()),
            ("INQR_DVSN_2", "0".to_string()),
        ]);
        let response = self.client.get(CANCELABLE_PATH, TR_CANCELABLE, &params).await?;
        Ok(response
            .get("output")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(parse_cancelable).collect())
            .unwrap_or_default())
    }
}

impl BrokerApi for LiveBroker {
    fn submit<'a>(&'a self, order: &'a OrderMessage) -> BoxFuture<'a, Result<Submission, SubmitError>> {
        Box::pin(self.submit_order(order))
    }

    fn cancel<'a>(&'a self, request: &'a CancelRequest) -> BoxFuture<'a, Result<String, SubmitError>> {
        Box::pin(self.cancel_order(request))
    }

    fn cancelable_orders(&self) -> BoxFuture<'_, Result<Vec<CancelableOrder>, SubmitError>> {
        Box::pin(self.list_cancelable())
    }

    fn is_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.client.credential_available())
    }
}
