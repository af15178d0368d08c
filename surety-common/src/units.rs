//! Value amounts. Everything is counted in integral base units so that the
//! 150% payout never loses precision to floating point.

/// Amount of value in base units.
pub type Amount = u128;

/// Base units in one whole unit of value (wei per ether).
pub const UNIT: Amount = 1_000_000_000_000_000_000;

/// Converts whole units into base units, saturating on overflow.
pub fn units(n: u64) -> Amount {
    (n as Amount).saturating_mul(UNIT)
}

/// Renders a base-unit amount as a decimal number of whole units, e.g. `1.5`.
pub fn format_units(amount: Amount) -> String {
    let whole = amount / UNIT;
    let frac = amount % UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:018}", frac);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(units(10)), "10");
        assert_eq!(format_units(units(3) / 2), "1.5");
        assert_eq!(format_units(1), "0.000000000000000001");
    }
}
