//! ISO4217 currency metadata needed to format [`crate::Money`] amounts.

/// Returns the number of decimal places (minor units per major unit) for a
/// given ISO4217 currency code. Unknown codes default to 2 with a logged
/// warning, matching the fallback most of our upstream fiat quotes use.
pub fn decimal_places(code: &str) -> u32 {
    match code {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
        "KWD" | "BHD" | "OMR" | "JOD" | "TND" => 3,
        "USD" | "EUR" | "GBP" | "CHF" | "CAD" | "AUD" | "CNY" | "NZD" | "SGD" | "HKD" | "MXN"
        | "BRL" | "INR" | "ZAR" | "SEK" | "NOK" | "DKK" | "PLN" | "CZK" | "HUF" | "TRY" => 2,
        other => {
            tracing::warn!(code = %other, "unknown currency code, defaulting to 2 decimal places");
            2
        }
    }
}

/// Returns `true` if `code` looks like a 3-letter uppercase ISO4217 code.
/// Does not validate against a known-currency list -- callers that need
/// strict validation should use [`decimal_places`]'s warning as a signal.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpy_has_no_decimals() {
        assert_eq!(decimal_places("JPY"), 0);
    }

    #[test]
    fn kwd_has_three_decimals() {
        assert_eq!(decimal_places("KWD"), 3);
    }

    #[test]
    fn usd_has_two_decimals() {
        assert_eq!(decimal_places("USD"), 2);
    }

    #[test]
    fn well_formed_codes() {
        assert!(is_well_formed("USD"));
        assert!(!is_well_formed("usd"));
        assert!(!is_well_formed("US"));
    }
}
