//! Performance metrics computed from a round-trip history and an equity
//! curve: P/L, hit rate, profit factor, drawdown, risk-adjusted returns,
//! holding-period stats, streaks, and period returns.

use std::collections::BTreeMap;

use btk_bar::{EquityPoint, Micros, RoundTrip};
use btk_clock::epoch_secs_to_ymd;
use serde::{Deserialize, Serialize};

/// Daily risk-free rate used in the Sharpe numerator, applied unconditionally
/// regardless of the bar interval actually backtested. An intra-day run is
/// therefore under-annualized relative to its true bar frequency; this is a
/// known, intentionally preserved bias rather than an oversight — do not
/// "fix" it to an interval-aware rate without updating every stored report
/// that depends on comparability against older runs.
const DAILY_RISK_FREE_RATE: f64 = 0.02 / 252.0;

/// Reported in place of a true ratio when the denominator is zero but the
/// numerator is not (e.g. no losing trades at all).
const SENTINEL_RATIO: f64 = 999.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_pl: Micros,
    pub total_pl_percent: f64,
    pub avg_pl_per_trade: Micros,
    pub avg_win: Micros,
    pub avg_loss: Micros,
    pub largest_win: Micros,
    pub largest_loss: Micros,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub hit_rate: f64,

    pub profit_factor: f64,
    pub risk_reward_ratio: f64,
    pub max_drawdown: Micros,
    pub max_drawdown_percent: f64,
    pub recovery_factor: f64,

    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    pub avg_holding_minutes: f64,
    pub min_holding_minutes: f64,
    pub max_holding_minutes: f64,

    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,

    /// `"YYYY-MM"` -> return percent for that calendar month.
    pub monthly_returns: BTreeMap<String, f64>,
    pub daily_returns: Vec<f64>,
}

impl PerformanceMetrics {
    pub fn empty() -> PerformanceMetrics {
        PerformanceMetrics {
            total_pl: Micros::ZERO,
            total_pl_percent: 0.0,
            avg_pl_per_trade: Micros::ZERO,
            avg_win: Micros::ZERO,
            avg_loss: Micros::ZERO,
            largest_win: Micros::ZERO,
            largest_loss: Micros::ZERO,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            hit_rate: 0.0,
            profit_factor: 0.0,
            risk_reward_ratio: 0.0,
            max_drawdown: Micros::ZERO,
            max_drawdown_percent: 0.0,
            recovery_factor: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            avg_holding_minutes: 0.0,
            min_holding_minutes: 0.0,
            max_holding_minutes: 0.0,
            longest_win_streak: 0,
            longest_loss_streak: 0,
            monthly_returns: BTreeMap::new(),
            daily_returns: Vec::new(),
        }
    }
}

/// Computes the full metrics report. Round trips are assumed ordered by
/// exit time (the order `build_round_trips` emits them in); the equity
/// curve is assumed ordered by timestamp.
pub fn compute_metrics(round_trips: &[RoundTrip], equity_curve: &[EquityPoint], initial_capital: Micros) -> PerformanceMetrics {
    if round_trips.is_empty() && equity_curve.is_empty() {
        return PerformanceMetrics::empty();
    }

    let total_pl: i64 = round_trips.iter().map(|rt| rt.pnl.raw()).sum();
    let total_pl = Micros::new(total_pl);
    let total_pl_percent = if initial_capital.raw() != 0 { total_pl.to_f64() / initial_capital.to_f64() * 100.0 } else { 0.0 };

    let wins: Vec<&RoundTrip> = round_trips.iter().filter(|rt| rt.is_win()).collect();
    let losses: Vec<&RoundTrip> = round_trips.iter().filter(|rt| !rt.is_win()).collect();

    let avg_pl_per_trade = if !round_trips.is_empty() { Micros::new(total_pl.raw() / round_trips.len() as i64) } else { Micros::ZERO };
    let avg_win = average_pnl(&wins);
    let avg_loss = average_pnl(&losses).abs();
    let largest_win = wins.iter().map(|rt| rt.pnl.raw()).max().map(Micros::new).unwrap_or(Micros::ZERO);
    let largest_loss = losses.iter().map(|rt| rt.pnl.raw()).min().map(Micros::new).unwrap_or(Micros::ZERO);

    let total_trades = round_trips.len();
    let winning_trades = wins.len();
    let losing_trades = losses.len();
    let hit_rate = if total_trades > 0 { winning_trades as f64 / total_trades as f64 * 100.0 } else { 0.0 };

    let gross_wins: i64 = wins.iter().map(|rt| rt.pnl.raw()).sum();
    let gross_losses: i64 = losses.iter().map(|rt| rt.pnl.raw()).sum();
    let profit_factor = ratio_with_sentinel(gross_wins as f64, gross_losses.unsigned_abs() as f64);
    let risk_reward_ratio = ratio_with_sentinel(avg_win.to_f64(), avg_loss.to_f64());

    let (max_drawdown, max_drawdown_percent) = max_drawdown(equity_curve);
    let total_return = total_return_percent(equity_curve);
    let recovery_factor = if max_drawdown.raw() != 0 { total_pl.to_f64() / max_drawdown.to_f64() } else { 0.0 };

    let bar_returns = per_bar_returns(equity_curve);
    let sharpe_ratio = sharpe(&bar_returns);
    let sortino_ratio = sortino(&bar_returns);
    let annual_return = annualized_return_percent(equity_curve, total_return);
    let calmar_ratio = if max_drawdown_percent != 0.0 { annual_return / max_drawdown_percent } else { 0.0 };

    let holding_minutes: Vec<f64> = round_trips.iter().map(RoundTrip::holding_minutes).collect();
    let avg_holding_minutes = mean(&holding_minutes);
    let min_holding_minutes = holding_minutes.iter().cloned().fold(f64::INFINITY, f64::min);
    let min_holding_minutes = if min_holding_minutes.is_finite() { min_holding_minutes } else { 0.0 };
    let max_holding_minutes = holding_minutes.iter().cloned().fold(0.0_f64, f64::max);

    let (longest_win_streak, longest_loss_streak) = streaks(round_trips);
    let monthly_returns = monthly_returns(equity_curve);

    PerformanceMetrics {
        total_pl,
        total_pl_percent,
        avg_pl_per_trade,
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        total_trades,
        winning_trades,
        losing_trades,
        hit_rate,
        profit_factor,
        risk_reward_ratio,
        max_drawdown,
        max_drawdown_percent,
        recovery_factor,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        avg_holding_minutes,
        min_holding_minutes,
        max_holding_minutes,
        longest_win_streak,
        longest_loss_streak,
        monthly_returns,
        daily_returns: bar_returns,
    }
}

fn average_pnl(trades: &[&RoundTrip]) -> Micros {
    if trades.is_empty() {
        return Micros::ZERO;
    }
    let sum: i64 = trades.iter().map(|rt| rt.pnl.raw()).sum();
    Micros::new(sum / trades.len() as i64)
}

fn ratio_with_sentinel(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator > 0.0 {
            SENTINEL_RATIO
        } else {
            0.0
        }
    } else {
        numerator / denominator
    }
}

/// `(absolute drawdown, drawdown percent)` against the equity curve's own
/// running high-water mark. The two are tracked independently: the bar
/// with the largest dollar drawdown need not be the bar with the largest
/// percentage drawdown (a small hwm early on can produce a worse percentage
/// than a much larger absolute dip later).
fn max_drawdown(curve: &[EquityPoint]) -> (Micros, f64) {
    let mut hwm = i64::MIN;
    let mut worst_abs = 0i64;
    let mut worst_pct = 0.0;
    for point in curve {
        let value = point.portfolio_value.raw();
        hwm = hwm.max(value);
        let dd = hwm - value;
        worst_abs = worst_abs.max(dd);
        if hwm > 0 {
            worst_pct = f64::max(worst_pct, dd as f64 / hwm as f64 * 100.0);
        }
    }
    (Micros::new(worst_abs), worst_pct)
}

fn total_return_percent(curve: &[EquityPoint]) -> f64 {
    match (curve.first(), curve.last()) {
        (Some(first), Some(last)) if first.portfolio_value.raw() != 0 => {
            (last.portfolio_value.to_f64() - first.portfolio_value.to_f64()) / first.portfolio_value.to_f64() * 100.0
        }
        _ => 0.0,
    }
}

/// Compounds `total_return_percent` out to a 365-day year (CAGR) so Calmar
/// compares like with like against `max_drawdown_percent`, which is itself
/// scale-free with respect to run length. Falls back to the un-annualized
/// return when the curve spans under a day, where compounding a tiny window
/// out to a year would blow up rather than inform.
fn annualized_return_percent(curve: &[EquityPoint], total_return_percent: f64) -> f64 {
    let days = match (curve.first(), curve.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp) as f64 / 86_400.0,
        _ => 0.0,
    };
    if days < 1.0 {
        return total_return_percent;
    }
    let years = days / 365.0;
    let base = 1.0 + total_return_percent / 100.0;
    if base <= 0.0 {
        return -100.0;
    }
    (base.powf(1.0 / years) - 1.0) * 100.0
}

fn per_bar_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .filter(|w| w[0].portfolio_value.raw() != 0)
        .map(|w| (w[1].portfolio_value.to_f64() - w[0].portfolio_value.to_f64()) / w[0].portfolio_value.to_f64())
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn downside_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sq_sum: f64 = values.iter().filter(|v| **v < 0.0).map(|v| v.powi(2)).sum();
    (sq_sum / values.len() as f64).sqrt()
}

fn sharpe(returns: &[f64]) -> f64 {
    let sd = stddev(returns);
    if sd == 0.0 {
        return 0.0;
    }
    (mean(returns) - DAILY_RISK_FREE_RATE) / sd
}

fn sortino(returns: &[f64]) -> f64 {
    let dd = downside_deviation(returns);
    if dd == 0.0 {
        return 0.0;
    }
    (mean(returns) - DAILY_RISK_FREE_RATE) / dd
}

fn streaks(round_trips: &[RoundTrip]) -> (u32, u32) {
    let mut longest_win = 0;
    let mut longest_loss = 0;
    let mut current_win = 0;
    let mut current_loss = 0;
    for rt in round_trips {
        if rt.is_win() {
            current_win += 1;
            current_loss = 0;
        } else {
            current_loss += 1;
            current_win = 0;
        }
        longest_win = longest_win.max(current_win);
        longest_loss = longest_loss.max(current_loss);
    }
    (longest_win, longest_loss)
}

fn monthly_returns(curve: &[EquityPoint]) -> BTreeMap<String, f64> {
    let mut by_month: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for point in curve {
        let (y, m, _) = epoch_secs_to_ymd(point.timestamp);
        let key = format!("{y:04}-{m:02}");
        let value = point.portfolio_value.to_f64();
        by_month.entry(key).and_modify(|(_, end)| *end = value).or_insert((value, value));
    }
    by_month
        .into_iter()
        .map(|(key, (start, end))| {
            let pct = if start != 0.0 { (end - start) / start * 100.0 } else { 0.0 };
            (key, pct)
        })
        .collect()
}
