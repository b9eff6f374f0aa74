use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::broker::{AccountInfo, Broker, BrokerResult, Deal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_profit: f64,
    /// Percent.
    pub win_rate: f64,
}

impl DailyStats {
    /// Deals with zero profit (entries, balance operations) are not counted.
    pub fn from_deals(deals: &[Deal]) -> Self {
        let mut stats = DailyStats::default();
        for deal in deals.iter().filter(|d| d.profit != 0.0) {
            stats.total_profit += deal.profit;
            if deal.profit > 0.0 {
                stats.winning_trades += 1;
            } else {
                stats.losing_trades += 1;
            }
        }
        stats.total_trades = stats.winning_trades + stats.losing_trades;
        if stats.total_trades > 0 {
            stats.win_rate = stats.winning_trades as f64 / stats.total_trades as f64 * 100.0;
        }
        stats
    }
}

/// Midnight of `now`'s calendar day in `tz`, as UTC.
pub fn start_of_day(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local_date = now.with_timezone(&tz).date_naive();
    tz.from_local_datetime(&local_date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Statistics over deals since local midnight. `now` defaults to the clock.
pub async fn today_statistics(
    broker: &dyn Broker,
    tz: Tz,
    now: Option<DateTime<Utc>>,
) -> BrokerResult<DailyStats> {
    let now = now.unwrap_or_else(Utc::now);
    let deals = broker.history_deals(start_of_day(now, tz), now).await?;
    Ok(DailyStats::from_deals(&deals))
}

pub async fn account_snapshot(broker: &dyn Broker) -> BrokerResult<AccountInfo> {
    broker.account_info().await
}

pub fn log_summary(stats: &DailyStats, account: Option<&AccountInfo>) {
    info!(
        "Today: {} trades ({} won, {} lost) | PnL {:+.2} | Win rate {:.1}%",
        stats.total_trades,
        stats.winning_trades,
        stats.losing_trades,
        stats.total_profit,
        stats.win_rate
    );
    if let Some(a) = account {
        info!(
            "Account {}: balance {:.2} {} | equity {:.2} | margin {:.2} | free {:.2} | 1:{}",
            a.login, a.balance, a.currency, a.equity, a.margin, a.margin_free, a.leverage
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use chrono_tz::Asia::Riyadh;

    fn deal(profit: f64) -> Deal {
        Deal {
            ticket: 1,
            position: 1,
            symbol: "XAUUSDm".to_string(),
            profit,
            time: Utc::now(),
        }
    }

    #[test]
    fn counts_only_closing_deals() {
        let stats = DailyStats::from_deals(&[deal(10.0), deal(0.0), deal(-4.0), deal(6.0)]);
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.winning_trades, 2);
        assert!((stats.total_profit - 12.0).abs() < 1e-9);
        assert!((stats.win_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(DailyStats::from_deals(&[]), DailyStats::default());
    }

    #[test]
    fn day_starts_at_local_midnight() {
        let now = DateTime::parse_from_rfc3339("2025-03-10T22:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // 01:30 on the 11th in Riyadh (UTC+3)
        let start = start_of_day(now, Riyadh);
        assert_eq!(start.to_rfc3339(), "2025-03-10T21:00:00+00:00");
        assert_eq!(start_of_day(now, Tz::UTC).to_rfc3339(), "2025-03-10T00:00:00+00:00");
    }

    #[tokio::test]
    async fn closed_paper_trade_shows_up_today() {
        let broker = PaperBroker::with_default_catalog(10_000.0);
        let request = crate::broker::OrderRequest {
            action: crate::broker::TradeAction::Deal,
            symbol: "XAUUSDm".to_string(),
            volume: 0.01,
            order_type: Some(crate::broker::BrokerOrderType::Buy),
            price: 0.0,
            sl: 3330.0,
            tp: 3345.0,
            deviation: 20,
            magic: 1,
            comment: String::new(),
            filling: None,
            position: None,
        };
        broker.order_send(&request).await.unwrap();
        broker.set_tick("XAUUSDm", 3346.0, 3346.25);

        let stats = today_statistics(&broker, Tz::UTC, None).await.unwrap();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.winning_trades, 1);
        let account = account_snapshot(&broker).await.unwrap();
        assert!(account.balance > 10_000.0);
    }
}
