//! Broker contract consumed by the engine (§6 "Broker contract").
//!
//! No concrete broker simulation lives in this crate — order matching and
//! fills are explicitly out of scope (§1) — this module only fixes the
//! interface the engine drives every tick.

use crate::domain::{Price, Quantity};
use crate::error::TempolineResult;
use crate::time::TimeNum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Partial,
    Completed,
    Canceled,
    Expired,
    Margin,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderNotification {
    pub order_id: u64,
    pub status: OrderStatus,
    pub executed_price: Option<Price>,
    pub executed_size: Option<Quantity>,
    pub datetime: TimeNum,
}

/// A single `(datetime, share_value, net_asset_value)` entry, per the
/// treatment decided for `_fhistory` in SPEC_FULL.md's Open Questions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundHistoryEntry {
    pub datetime: TimeNum,
    pub share_value: f64,
    pub net_asset_value: f64,
}

pub trait Broker {
    fn start(&mut self) -> TempolineResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// Invoked each tick after data delivery (or the cheat-on-open slot).
    fn next(&mut self) -> TempolineResult<()>;

    /// Drained each tick; returns `None` once no further notifications are
    /// pending for this tick.
    fn get_notification(&mut self) -> Option<OrderNotification>;

    fn set_cheat_on_open(&mut self, enabled: bool);

    /// Replaces the fund-history series used for share-value accounting.
    /// Entries must be sorted ascending by datetime; malformed input (out
    /// of order, or non-finite values) is rejected.
    fn set_fund_history(&mut self, entries: Vec<FundHistoryEntry>) -> TempolineResult<()>;
}

/// Validates the ordering/finiteness invariant every `Broker` impl must
/// enforce on `set_fund_history` (SPEC_FULL.md's Open Question decision on
/// `_fhistory`'s schema).
pub fn validate_fund_history(entries: &[FundHistoryEntry]) -> TempolineResult<()> {
    let mut prev: Option<TimeNum> = None;
    for entry in entries {
        if !entry.share_value.is_finite() || !entry.net_asset_value.is_finite() {
            return Err(crate::error::ConfigError::MalformedFundHistory(format!(
                "non-finite value at {:?}",
                entry.datetime
            ))
            .into());
        }
        if let Some(p) = prev {
            if entry.datetime < p {
                return Err(crate::error::ConfigError::MalformedFundHistory(
                    "entries must be sorted ascending by datetime".to_string(),
                )
                .into());
            }
        }
        prev = Some(entry.datetime);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_order_fund_history() {
        let entries = vec![
            FundHistoryEntry {
                datetime: TimeNum(2.0),
                share_value: 1.0,
                net_asset_value: 100.0,
            },
            FundHistoryEntry {
                datetime: TimeNum(1.0),
                share_value: 1.0,
                net_asset_value: 100.0,
            },
        ];
        assert!(validate_fund_history(&entries).is_err());
    }

    #[test]
    fn rejects_non_finite_values() {
        let entries = vec![FundHistoryEntry {
            datetime: TimeNum(1.0),
            share_value: f64::NAN,
            net_asset_value: 100.0,
        }];
        assert!(validate_fund_history(&entries).is_err());
    }
}
