//! Integer money arithmetic.
//!
//! Every amount in the pipeline is carried in minor units (paise for INR,
//! cents for USD). Rates are basis points so tax and percentage discounts
//! stay exact; rounding is half away from zero at the minor unit.

/// An amount in minor units.
pub type Minor = i64;

pub const BASIS_POINTS_PER_UNIT: i64 = 10_000;

/// `amount * bp / 10_000`, rounded half away from zero.
pub fn apply_basis_points(amount: Minor, bp: i64) -> Minor {
    round_div(amount as i128 * bp as i128, BASIS_POINTS_PER_UNIT as i128) as Minor
}

/// Converts a percentage such as `5.0` or `12.5` into basis points.
pub fn percentage_to_basis_points(percentage: f64) -> i64 {
    (percentage * 100.0).round() as i64
}

/// `amount * percentage / 100`, rounded to the minor unit.
pub fn apply_percentage(amount: Minor, percentage: f64) -> Minor {
    apply_basis_points(amount, percentage_to_basis_points(percentage))
}

/// Multiplies by an exchange rate, rounding to the minor unit.
pub fn convert(amount: Minor, rate: f64) -> Minor {
    (amount as f64 * rate).round() as Minor
}

/// Renders minor units as a two-decimal major amount, e.g. `1062450` -> `"10624.50"`.
pub fn to_major_string(amount: Minor) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn round_div(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    }
}
