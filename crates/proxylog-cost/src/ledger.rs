// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily cost ledger with cap enforcement.
//!
//! The ledger keeps today's cumulative spend in memory under a single
//! `tokio::sync::Mutex`. Every operation first checks whether the UTC date has
//! changed and, if so, resets the total to zero before doing anything else.
//!
//! The cap check is advisory with respect to in-flight requests: several
//! requests may pass [`CostLedger::check_cap`] before any of their costs land.
//! A single exchange may therefore push the total past the cap; only the next
//! check is blocked.
//!
//! On restart, [`CostLedger::restore`] seeds the total from the most recent
//! durable record for today so enforcement survives process restarts.

use chrono::{DateTime, NaiveDate, Utc};
use proxylog_config::model::LimitsConfig;
use proxylog_core::{Cost, CostSnapshot, ProxylogError};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Warn once the day's spend crosses this share of the cap.
const WARN_PERCENT: u64 = 80;

/// Outcome of a pre-request cap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapDecision {
    /// Today's spend is below the cap.
    Allowed,
    /// Today's spend has reached the cap.
    Blocked {
        current: Cost,
        cap: Cost,
        /// Seconds until the next UTC midnight.
        retry_after_secs: u64,
    },
}

impl CapDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CapDecision::Allowed)
    }

    /// JSON body for the HTTP 429 response the boundary sends when blocked.
    ///
    /// Returns `None` for [`CapDecision::Allowed`].
    pub fn error_body(&self) -> Option<Value> {
        match *self {
            CapDecision::Allowed => None,
            CapDecision::Blocked {
                current,
                cap,
                retry_after_secs,
            } => Some(json!({
                "error": "daily_cost_limit_exceeded",
                "message": format!(
                    "Daily cost limit exceeded. Current: €{:.4}, Limit: €{:.2}. Resets at UTC midnight.",
                    current.to_decimal(),
                    cap.to_decimal()
                ),
                "current_cost_eur": current.to_decimal(),
                "limit_eur": cap.to_decimal(),
                "retry_after_seconds": retry_after_secs,
            })),
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    cumulative: Cost,
    date: NaiveDate,
}

impl LedgerState {
    /// Reset the total if `today` is a different UTC day.
    fn roll_over(&mut self, today: NaiveDate) {
        if self.date != today {
            info!(
                previous_date = %self.date,
                previous_total = %self.cumulative,
                %today,
                "new UTC day, resetting daily cost"
            );
            self.cumulative = Cost::ZERO;
            self.date = today;
        }
    }
}

/// In-memory daily spend tracker shared by every request task.
#[derive(Debug)]
pub struct CostLedger {
    state: Mutex<LedgerState>,
    cap: Cost,
}

impl CostLedger {
    /// Create a ledger with a zero total for today.
    pub fn new(cap: Cost) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                cumulative: Cost::ZERO,
                date: Utc::now().date_naive(),
            }),
            cap,
        }
    }

    /// Create a ledger from the `[limits]` config section.
    pub fn from_config(limits: &LimitsConfig) -> Result<Self, ProxylogError> {
        let cap = Cost::from_decimal(limits.daily_cost_cap_eur).ok_or_else(|| {
            ProxylogError::Config(format!(
                "limits.daily_cost_cap_eur must be a non-negative number, got {}",
                limits.daily_cost_cap_eur
            ))
        })?;
        Ok(Self::new(cap))
    }

    /// The configured daily cap.
    pub fn cap(&self) -> Cost {
        self.cap
    }

    /// Seed today's total from the most recent durable record.
    ///
    /// The snapshot is used only if it belongs to today's UTC date; missing or
    /// stale history leaves the total at zero. Returns the resulting total.
    pub async fn restore(&self, snapshot: Option<CostSnapshot>) -> Cost {
        self.restore_on(snapshot, Utc::now().date_naive()).await
    }

    /// [`restore`](Self::restore) with an explicit "today".
    pub async fn restore_on(&self, snapshot: Option<CostSnapshot>, today: NaiveDate) -> Cost {
        let mut state = self.state.lock().await;
        state.date = today;
        state.cumulative = match snapshot {
            Some(snapshot) if snapshot.date() == today => {
                info!(total = %snapshot.cumulative, "recovered daily cost from log");
                snapshot.cumulative
            }
            Some(snapshot) => {
                info!(
                    last_record_date = %snapshot.date(),
                    "last record is from an earlier day, starting at zero"
                );
                Cost::ZERO
            }
            None => {
                info!("no records for today, starting at zero");
                Cost::ZERO
            }
        };
        state.cumulative
    }

    /// Decide whether another exchange may start.
    pub async fn check_cap(&self) -> CapDecision {
        self.check_cap_at(Utc::now()).await
    }

    /// [`check_cap`](Self::check_cap) against an explicit clock reading.
    pub async fn check_cap_at(&self, now: DateTime<Utc>) -> CapDecision {
        let mut state = self.state.lock().await;
        state.roll_over(now.date_naive());

        if state.cumulative >= self.cap {
            debug!(current = %state.cumulative, cap = %self.cap, "daily cost cap reached");
            return CapDecision::Blocked {
                current: state.cumulative,
                cap: self.cap,
                retry_after_secs: seconds_until_reset(now),
            };
        }
        CapDecision::Allowed
    }

    /// Add a completed exchange's cost and return the new total.
    pub async fn add_cost(&self, cost: Cost) -> Cost {
        self.add_cost_at(cost, Utc::now()).await
    }

    /// [`add_cost`](Self::add_cost) against an explicit clock reading.
    pub async fn add_cost_at(&self, cost: Cost, now: DateTime<Utc>) -> Cost {
        let mut state = self.state.lock().await;
        state.roll_over(now.date_naive());

        let before = state.cumulative;
        state.cumulative += cost;

        let threshold = Cost::from_micros(self.cap.micros() / 100 * WARN_PERCENT);
        if before < threshold && state.cumulative >= threshold {
            warn!(
                total = %state.cumulative,
                cap = %self.cap,
                "approaching daily cost cap (80%+)"
            );
        }
        state.cumulative
    }

    /// Today's total so far.
    pub async fn current_cost(&self) -> Cost {
        self.current_cost_at(Utc::now()).await
    }

    /// [`current_cost`](Self::current_cost) against an explicit clock reading.
    pub async fn current_cost_at(&self, now: DateTime<Utc>) -> Cost {
        let mut state = self.state.lock().await;
        state.roll_over(now.date_naive());
        state.cumulative
    }

    /// Seconds until the total resets at the next UTC midnight.
    pub fn seconds_until_reset(&self) -> u64 {
        seconds_until_reset(Utc::now())
    }
}

/// Seconds from `now` until the next UTC midnight, rounded up.
pub fn seconds_until_reset(now: DateTime<Utc>) -> u64 {
    now.date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .map(|midnight| {
            let millis = (midnight.and_utc() - now).num_milliseconds().max(0) as u64;
            millis.div_ceil(1000)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use tracing_test::traced_test;

    use super::*;

    fn eur(value: f64) -> Cost {
        Cost::from_decimal(value).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn snapshot(timestamp: DateTime<Utc>, cumulative: Cost) -> CostSnapshot {
        CostSnapshot {
            timestamp,
            cumulative,
        }
    }

    #[tokio::test]
    async fn cap_equal_to_total_blocks() {
        let ledger = CostLedger::new(eur(5.0));
        let now = at(2026, 10, 16, 12, 0, 0);
        ledger.add_cost_at(eur(5.0), now).await;
        assert!(!ledger.check_cap_at(now).await.is_allowed());
    }

    #[tokio::test]
    async fn total_just_below_cap_is_allowed() {
        let ledger = CostLedger::new(eur(5.0));
        let now = at(2026, 10, 16, 12, 0, 0);
        ledger.add_cost_at(eur(4.99), now).await;
        assert_eq!(ledger.check_cap_at(now).await, CapDecision::Allowed);
    }

    #[tokio::test]
    async fn single_exchange_may_overshoot_then_next_is_blocked() {
        let ledger = CostLedger::new(eur(5.0));
        let now = at(2026, 10, 16, 12, 0, 0);
        ledger.add_cost_at(eur(4.5), now).await;

        assert!(ledger.check_cap_at(now).await.is_allowed());
        let total = ledger.add_cost_at(eur(0.6), now).await;
        assert_eq!(total, eur(5.1));

        match ledger.check_cap_at(now).await {
            CapDecision::Blocked {
                current,
                cap,
                retry_after_secs,
            } => {
                assert_eq!(current, eur(5.1));
                assert_eq!(cap, eur(5.0));
                assert_eq!(retry_after_secs, 12 * 3600);
            }
            CapDecision::Allowed => panic!("expected cap to block"),
        }
    }

    #[tokio::test]
    async fn new_utc_day_resets_total() {
        let ledger = CostLedger::new(eur(5.0));
        let late = at(2026, 10, 16, 23, 59, 59);
        ledger.add_cost_at(eur(6.0), late).await;
        assert!(!ledger.check_cap_at(late).await.is_allowed());

        let next_day = at(2026, 10, 17, 0, 0, 1);
        assert!(ledger.check_cap_at(next_day).await.is_allowed());
        assert_eq!(ledger.current_cost_at(next_day).await, Cost::ZERO);
    }

    #[tokio::test]
    async fn add_cost_after_midnight_starts_fresh_total() {
        let ledger = CostLedger::new(eur(5.0));
        ledger.add_cost_at(eur(3.0), at(2026, 10, 16, 22, 0, 0)).await;
        let total = ledger.add_cost_at(eur(0.25), at(2026, 10, 17, 0, 5, 0)).await;
        assert_eq!(total, eur(0.25));
    }

    #[tokio::test]
    async fn restore_uses_snapshot_from_today() {
        let ledger = CostLedger::new(eur(5.0));
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let restored = ledger
            .restore_on(Some(snapshot(at(2026, 10, 16, 8, 0, 0), eur(4.2))), today)
            .await;
        assert_eq!(restored, eur(4.2));
        assert_eq!(
            ledger.current_cost_at(at(2026, 10, 16, 9, 0, 0)).await,
            eur(4.2)
        );
    }

    #[tokio::test]
    async fn restore_ignores_stale_snapshot() {
        let ledger = CostLedger::new(eur(5.0));
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let restored = ledger
            .restore_on(Some(snapshot(at(2026, 10, 15, 23, 0, 0), eur(4.2))), today)
            .await;
        assert_eq!(restored, Cost::ZERO);
    }

    #[tokio::test]
    async fn restore_without_history_is_zero() {
        let ledger = CostLedger::new(eur(5.0));
        ledger.add_cost(eur(1.0)).await;
        assert_eq!(ledger.restore(None).await, Cost::ZERO);
        assert_eq!(ledger.current_cost().await, Cost::ZERO);
    }

    #[tokio::test]
    async fn zero_cap_blocks_everything() {
        let ledger = CostLedger::new(Cost::ZERO);
        assert!(!ledger.check_cap().await.is_allowed());
    }

    #[tokio::test]
    async fn concurrent_adds_are_not_lost() {
        let ledger = Arc::new(CostLedger::new(eur(1000.0)));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    ledger.add_cost(eur(0.01)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.current_cost().await, eur(10.0));
    }

    #[tokio::test]
    #[traced_test]
    async fn crossing_eighty_percent_warns() {
        let ledger = CostLedger::new(eur(10.0));
        let now = at(2026, 10, 16, 12, 0, 0);
        ledger.add_cost_at(eur(7.0), now).await;
        assert!(!logs_contain("approaching daily cost cap"));
        ledger.add_cost_at(eur(1.5), now).await;
        assert!(logs_contain("approaching daily cost cap"));
    }

    #[test]
    fn error_body_matches_wire_shape() {
        let decision = CapDecision::Blocked {
            current: eur(5.1),
            cap: eur(5.0),
            retry_after_secs: 3600,
        };
        let body = decision.error_body().unwrap();
        assert_eq!(body["error"], "daily_cost_limit_exceeded");
        assert_eq!(body["current_cost_eur"], 5.1);
        assert_eq!(body["limit_eur"], 5.0);
        assert_eq!(body["retry_after_seconds"], 3600);
        assert!(body["message"].as_str().unwrap().contains("€5.1000"));
        assert!(CapDecision::Allowed.error_body().is_none());
    }

    #[test]
    fn seconds_until_reset_counts_to_next_midnight() {
        assert_eq!(seconds_until_reset(at(2026, 10, 16, 0, 0, 0)), 86_400);
        assert_eq!(seconds_until_reset(at(2026, 10, 16, 23, 59, 0)), 60);
        let fractional = at(2026, 10, 16, 23, 59, 59) + chrono::Duration::milliseconds(500);
        assert_eq!(seconds_until_reset(fractional), 1);
    }

    #[test]
    fn from_config_converts_cap() {
        let ledger = CostLedger::from_config(&LimitsConfig {
            daily_cost_cap_eur: 2.5,
        })
        .unwrap();
        assert_eq!(ledger.cap(), eur(2.5));

        let err = CostLedger::from_config(&LimitsConfig {
            daily_cost_cap_eur: -1.0,
        })
        .unwrap_err();
        assert!(matches!(err, ProxylogError::Config(_)));
    }
}
