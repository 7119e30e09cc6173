//! Price-band screening of quotes.

use rust_decimal::Decimal;

use super::symbol::Quote;

/// Quotes priced inside `[min_price, max_price]`, cheapest first. Ties are
/// broken by symbol so the order is stable across runs.
pub fn filter_by_price_range<'a, I>(quotes: I, min_price: Decimal, max_price: Decimal) -> Vec<&'a Quote>
where
    I: IntoIterator<Item = &'a Quote>,
{
    let mut matched: Vec<&Quote> = quotes
        .into_iter()
        .filter(|q| min_price <= q.price && q.price <= max_price)
        .collect();
    matched.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.symbol.cmp(&b.symbol)));
    matched
}
