use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{Holding, HoldingBreakdown, PortfolioSnapshot, Quote};

/// Quotes gathered in one cycle, keyed by uppercase ticker. `None` marks a
/// ticker whose lookup returned no data or failed.
pub type QuoteMap = HashMap<String, Option<Quote>>;

/// Join `holdings` with `quotes` and compute the portfolio metrics.
///
/// A holding without a usable quote keeps its last known `current_price` and
/// contributes no daily change. Percentages are 0 whenever their denominator is 0.
pub fn aggregate(holdings: &[Holding], quotes: &QuoteMap, as_of: DateTime<Utc>) -> PortfolioSnapshot {
    let mut total_value = 0.0;
    let mut total_cost = 0.0;
    let mut daily_change_absolute = 0.0;
    let mut breakdown = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let quote = quotes
            .get(&holding.ticker.to_uppercase())
            .and_then(Option::as_ref);
        let (price, change) = match quote {
            Some(q) => (q.current_price, q.daily_change_absolute),
            None => (holding.current_price, 0.0),
        };

        let quantity = holding.quantity as f64;
        let value = quantity * price;
        let cost = quantity * holding.buy_price;
        let daily_change = quantity * change;

        total_value += value;
        total_cost += cost;
        daily_change_absolute += daily_change;

        breakdown.push(HoldingBreakdown {
            name: holding.name.clone(),
            ticker: holding.ticker.clone(),
            quantity: holding.quantity,
            current_price: price,
            value,
            gain_loss: value - cost,
            daily_change,
            allocation_percent: 0.0,
            quoted: quote.is_some(),
        });
    }

    for item in &mut breakdown {
        item.allocation_percent = percent_of(item.value, total_value);
    }

    let total_gain_loss = total_value - total_cost;

    PortfolioSnapshot {
        total_value,
        total_cost,
        total_gain_loss,
        total_gain_loss_percent: percent_of(total_gain_loss, total_cost),
        daily_change_absolute,
        daily_change_percent: percent_of(daily_change_absolute, total_value),
        holding_count: holdings.len(),
        per_holding_breakdown: breakdown,
        as_of,
    }
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}
