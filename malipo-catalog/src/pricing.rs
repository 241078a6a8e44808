use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Total charge for a stay: nightly rate times whole nights, minimum one
/// night. Returns zero while either date is missing or the range is not
/// strictly increasing: "no quote yet", not an error.
///
/// Pure and side-effect-free, so callers can recompute it on every edit.
pub fn compute_quote(
    price_per_night: Decimal,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
) -> Decimal {
    let (check_in, check_out) = match (check_in, check_out) {
        (Some(check_in), Some(check_out)) => (check_in, check_out),
        _ => return Decimal::ZERO,
    };

    if check_out <= check_in {
        return Decimal::ZERO;
    }

    let nights = (check_out - check_in).num_days().max(1);
    price_per_night * Decimal::from(nights)
}
