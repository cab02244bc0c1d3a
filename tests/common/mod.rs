#![allow(dead_code)]

use nextbar::application::ml::boosting::GbmParams;
use nextbar::domain::market::bar::Bar;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

pub const START_TS: i64 = 1_700_000_000;

fn dec(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .expect("finite price")
        .round_dp(6)
}

/// One-minute bars following `closes`; highs/lows straddle open and close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let spread = (close * 0.002).max(0.01);
            let high = open.max(close) + spread;
            let low = (open.min(close) - spread).max(close * 0.5);
            Bar::new(
                START_TS + i as i64 * 60,
                dec(open),
                dec(high),
                dec(low),
                dec(close),
                Decimal::from(1_000 + (i % 7) as i64 * 100),
            )
        })
        .collect()
}

/// Strictly increasing closes with a small wobble in the step size.
pub fn rising_bars(n: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + 0.5 * i as f64 + 0.1 * (i as f64).sin())
        .collect();
    bars_from_closes(&closes)
}

/// Oscillating closes with a mild upward drift.
pub fn wave_bars(n: usize, phase: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 3.0 * (t / 4.0 + phase).sin() + 1.2 * (t / 1.7).cos() + 0.02 * t
        })
        .collect();
    bars_from_closes(&closes)
}

/// Smaller ensemble to keep test runtimes short.
pub fn quick_params() -> GbmParams {
    GbmParams {
        n_estimators: 60,
        max_depth: 3,
        ..Default::default()
    }
}
