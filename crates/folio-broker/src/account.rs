//! Brokerage account reads: balance, sellable quantity, buyable amount and
//! market volume.
//!
//! The live balance is cached; when a refresh fails the cached snapshot is
//! served with `data_stale = true`, and without a cache the error propagates.

use crate::client::{field_decimal, field_f64, field_str, field_u64, BrokerClient};
use crate::error::{BrokerError, BrokerResult};
use folio_core::{BoxFuture, PortfolioSnapshot, Position};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PATH_BALANCE: &str = "/uapi/domestic-stock/v1/trading/inquire-balance";
const PATH_PSBL_ORDER: &str = "/uapi/domestic-stock/v1/trading/inquire-psbl-order";
const PATH_PSBL_SELL: &str = "/uapi/domestic-stock/v1/trading/inquire-psbl-sell";
const PATH_CCNL: &str = "/uapi/domestic-stock/v1/quotations/inquire-ccnl";

const TR_ID_BALANCE: &str = "TTTC8434R";
const TR_ID_PSBL_ORDER: &str = "TTTC8908R";
const TR_ID_PSBL_SELL: &str = "TTTC8408R";
const TR_ID_CCNL: &str = "FHKST01010300";

/// Cash available for buying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyableAmount {
    /// Orderable cash.
    pub cash: Decimal,
    /// Maximum buy amount without margin.
    pub max_buy_amount: Decimal,
    /// Maximum buy quantity without margin.
    pub max_buy_quantity: u64,
}

/// Read-only brokerage account access.
pub trait AccountReader: Send + Sync {
    /// Current portfolio, possibly served stale from cache.
    fn portfolio(&self) -> BoxFuture<'_, BrokerResult<PortfolioSnapshot>>;

    /// Quantity of `ticker` that can be sold right now.
    fn sellable_quantity<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<u64>>;

    fn buyable_amount<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<BuyableAmount>>;

    /// Today's accumulated volume over the previous day's, for `ticker`.
    fn volume_ratio<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<f64>>;
}

/// Arc wrapper for AccountReader trait objects.
pub type DynAccountReader = Arc<dyn AccountReader>;

/// Map a balance inquiry response to a snapshot.
///
/// Holdings with zero quantity are skipped. The brokerage reports P/L in
/// percent; it is stored as a fraction.
pub fn parse_balance(body: &Value) -> BrokerResult<PortfolioSnapshot> {
    let holdings = body
        .get("output1")
        .and_then(Value::as_array)
        .ok_or_else(|| BrokerError::ParseError("balance response missing output1".to_string()))?;

    let summary = body
        .get("output2")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .cloned()
        .unwrap_or(Value::Null);

    let cash = field_decimal(&summary, "dnca_tot_amt");
    let total_value = field_decimal(&summary, "tot_evlu_amt");

    let positions = holdings
        .iter()
        .filter(|item| field_u64(item, "hldg_qty") > 0)
        .map(|item| {
            let mut position = Position::new(
                field_str(item, "pdno"),
                field_str(item, "prdt_name"),
                field_u64(item, "hldg_qty"),
                field_decimal(item, "pchs_avg_pric"),
                field_decimal(item, "prpr"),
                field_decimal(item, "evlu_amt"),
                total_value,
            );
            if item.get("evlu_pfls_rt").is_some() {
                position.profit_loss_rate = field_f64(item, "evlu_pfls_rt") / 100.0;
            }
            position
        })
        .collect();

    Ok(PortfolioSnapshot::new(cash, total_value, positions))
}

/// Account reader backed by the brokerage REST API.
pub struct BrokerAccountReader {
    client: Arc<BrokerClient>,
    cache: RwLock<Option<PortfolioSnapshot>>,
}

impl BrokerAccountReader {
    pub fn new(client: Arc<BrokerClient>) -> Self {
        Self {
            client,
            cache: RwLock::new(None),
        }
    }

    async fn fetch_portfolio(&self) -> BrokerResult<PortfolioSnapshot> {
        let mut params = self.client.account_fields().to_vec();
        params.extend(
            [
                ("AFHR_FLPR_YN", "N"),
                ("OFL_YN", ""),
                ("INQR_DVSN", "02"),
                ("UNPR_DVSN", "01"),
                ("FUND_STTL_ICLD_YN", "N"),
                ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                ("PRCS_DVSN", "00"),
                ("CTX_AREA_FK100", ""),
                ("CTX_AREA_NK100", ""),
            ]
            .map(|(k, v)| (k, v.to_string())),
        );

        let body = self.client.get(PATH_BALANCE, TR_ID_BALANCE, &params).await?;
        parse_balance(&body)
    }

    async fn read_portfolio(&self) -> BrokerResult<PortfolioSnapshot> {
        match self.fetch_portfolio().await {
            Ok(snapshot) => {
                debug!(
                    positions = snapshot.positions.len(),
                    total_value = %snapshot.total_value,
                    "Portfolio refreshed"
                );
                *self.cache.write() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => match self.cache.read().as_ref() {
                Some(cached) => {
                    warn!(error = %e, as_of = %cached.as_of, "Portfolio refresh failed, serving stale snapshot");
                    Ok(cached.as_stale())
                }
                None => Err(e),
            },
        }
    }

    async fn read_sellable(&self, ticker: &str) -> BrokerResult<u64> {
        let mut params = self.client.account_fields().to_vec();
        params.push(("PDNO", ticker.to_string()));
        let body = self.client.get(PATH_PSBL_SELL, TR_ID_PSBL_SELL, &params).await?;
        let output = body.get("output").cloned().unwrap_or(Value::Null);
        Ok(field_u64(&output, "ord_psbl_qty"))
    }

    async fn read_buyable(&self, ticker: &str) -> BrokerResult<BuyableAmount> {
        let mut params = self.client.account_fields().to_vec();
        params.extend(
            [
                ("PDNO", ticker),
                ("ORD_UNPR", "0"),
                ("ORD_DVSN", "01"),
                ("CMA_EVLU_AMT_ICLD_YN", "N"),
                ("OVRS_ICLD_YN", "N"),
            ]
            .map(|(k, v)| (k, v.to_string())),
        );
        let body = self.client.get(PATH_PSBL_ORDER, TR_ID_PSBL_ORDER, &params).await?;
        let output = body.get("output").cloned().unwrap_or(Value::Null);
        Ok(BuyableAmount {
            cash: field_decimal(&output, "ord_psbl_cash"),
            max_buy_amount: field_decimal(&output, "nrcvb_buy_amt"),
            max_buy_quantity: field_u64(&output, "nrcvb_buy_qty"),
        })
    }

    async fn read_volume_ratio(&self, ticker: &str) -> BrokerResult<f64> {
        let params = [
            ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
            ("FID_INPUT_ISCD", ticker.to_string()),
        ];
        let body = self.client.get(PATH_CCNL, TR_ID_CCNL, &params).await?;
        let output = body.get("output1").cloned().unwrap_or(Value::Null);
        let accumulated = field_u64(&output, "acml_vol");
        let previous = field_u64(&output, "prdy_vol");
        if previous == 0 {
            return Err(BrokerError::ParseError(
                "previous-day volume is zero".to_string(),
            ));
        }
        let ratio = accumulated as f64 / previous as f64;
        info!(ticker, accumulated, previous, ratio, "Volume ratio");
        Ok(ratio)
    }
}

impl AccountReader for BrokerAccountReader {
    fn portfolio(&self) -> BoxFuture<'_, BrokerResult<PortfolioSnapshot>> {
        Box::pin(self.read_portfolio())
    }

    fn sellable_quantity<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<u64>> {
        Box::pin(self.read_sellable(ticker))
    }

    fn buyable_amount<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<BuyableAmount>> {
        Box::pin(self.read_buyable(ticker))
    }

    fn volume_ratio<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<f64>> {
        Box::pin(self.read_volume_ratio(ticker))
    }
}

/// Mock account reader for testing.
#[derive(Debug, Default)]
pub struct MockAccountReader {
    snapshot: Mutex<Option<PortfolioSnapshot>>,
    sellable: Mutex<HashMap<String, u64>>,
    volume_ratio: Mutex<f64>,
    portfolio_reads: Mutex<u32>,
}

impl MockAccountReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the snapshot returned by `portfolio()`; `None` makes it fail.
    pub fn set_snapshot(&self, snapshot: Option<PortfolioSnapshot>) {
        *self.snapshot.lock() = snapshot;
    }

    pub fn set_sellable(&self, ticker: &str, quantity: u64) {
        self.sellable.lock().insert(ticker.to_string(), quantity);
    }

    pub fn set_volume_ratio(&self, ratio: f64) {
        *self.volume_ratio.lock() = ratio;
    }

    pub fn portfolio_reads(&self) -> u32 {
        *self.portfolio_reads.lock()
    }
}

impl AccountReader for MockAccountReader {
    fn portfolio(&self) -> BoxFuture<'_, BrokerResult<PortfolioSnapshot>> {
        Box::pin(async move {
            *self.portfolio_reads.lock() += 1;
            self.snapshot
                .lock()
                .clone()
                .ok_or_else(|| BrokerError::HttpClient("mock portfolio unavailable".to_string()))
        })
    }

    fn sellable_quantity<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, BrokerResult<u64>> {
        Box::pin(async move { Ok(self.sellable.lock().get(ticker).copied().unwrap_or(0)) })
    }

    fn buyable_amount<'a>(&'a self, _ticker: &'a str) -> BoxFuture<'a, BrokerResult<BuyableAmount>> {
        Box::pin(async move {
            let cash = self
                .snapshot
                .lock()
                .as_ref()
                .map(|s| s.cash)
                .unwrap_or_default();
            Ok(BuyableAmount {
                cash,
                max_buy_amount: cash,
                max_buy_quantity: 0,
            })
        })
    }

    fn volume_ratio<'a>(&'a self, _ticker: &'a str) -> BoxFuture<'a, BrokerResult<f64>> {
        Box::pin(async move { Ok(*self.volume_ratio.lock()) })
    }
}
