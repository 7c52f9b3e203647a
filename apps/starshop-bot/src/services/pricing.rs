use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::config::PricingConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("not a whole number")]
    NotANumber,
    #[error("quantity must be between {min} and {max}")]
    OutOfRange { min: i64, max: i64 },
    #[error("handle must start with @")]
    MissingSigil,
    #[error("handle is empty")]
    EmptyHandle,
    #[error("handle may contain only letters, digits and underscores")]
    InvalidHandleChars,
}

#[derive(Debug, Clone)]
pub struct Pricing {
    rate: Decimal,
    currency: String,
    min_stars: i64,
    max_stars: i64,
}

impl Pricing {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            rate: config.star_rate,
            currency: config.currency.clone(),
            min_stars: config.min_stars,
            max_stars: config.max_stars,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.min_stars, self.max_stars)
    }

    /// `stars * rate`, rounded half away from zero and always carrying two
    /// decimal places.
    pub fn quote(&self, stars: i64) -> Decimal {
        let mut price = (Decimal::from(stars) * self.rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        price.rescale(2);
        price
    }

    pub fn parse_stars(&self, input: &str) -> Result<i64, InputError> {
        let stars = input
            .trim()
            .parse::<i64>()
            .map_err(|_| InputError::NotANumber)?;
        if stars < self.min_stars || stars > self.max_stars {
            return Err(InputError::OutOfRange {
                min: self.min_stars,
                max: self.max_stars,
            });
        }
        Ok(stars)
    }
}

/// Accepts `@name` where `name` is non-empty ASCII alphanumerics or `_`.
/// Returns the handle without the sigil.
pub fn parse_handle(input: &str) -> Result<String, InputError> {
    let handle = input
        .trim()
        .strip_prefix('@')
        .ok_or(InputError::MissingSigil)?;
    if handle.is_empty() {
        return Err(InputError::EmptyHandle);
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(InputError::InvalidHandleChars);
    }
    Ok(handle.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing(rate: Decimal) -> Pricing {
        Pricing::new(&PricingConfig {
            star_rate: rate,
            ..PricingConfig::default()
        })
    }

    #[test]
    fn quote_has_exactly_two_decimals() {
        let p = pricing(Decimal::new(145, 2));
        assert_eq!(p.quote(75).to_string(), "108.75");
        assert_eq!(p.quote(100).to_string(), "145.00");
        assert_eq!(p.quote(50).scale(), 2);

        let odd = pricing(Decimal::new(13333, 4));
        // 75 * 1.3333 = 99.9975
        assert_eq!(odd.quote(75).to_string(), "100.00");
        // 51 * 1.3333 = 67.9983
        assert_eq!(odd.quote(51).to_string(), "68.00");
    }

    #[test]
    fn quote_matches_rounded_product_across_range() {
        let rate = Decimal::new(1337, 3);
        let p = pricing(rate);
        for stars in (50..=100_000).step_by(997) {
            let exact = Decimal::from(stars) * rate;
            let quoted = p.quote(stars);
            assert_eq!(quoted.scale(), 2);
            assert!((quoted - exact).abs() <= Decimal::new(5, 3), "stars={stars}");
        }
    }

    #[test]
    fn parse_stars_enforces_bounds() {
        let p = pricing(Decimal::ONE);
        assert_eq!(p.parse_stars("50"), Ok(50));
        assert_eq!(p.parse_stars(" 100000 "), Ok(100_000));
        assert_eq!(
            p.parse_stars("30"),
            Err(InputError::OutOfRange { min: 50, max: 100_000 })
        );
        assert_eq!(
            p.parse_stars("100001"),
            Err(InputError::OutOfRange { min: 50, max: 100_000 })
        );
        assert_eq!(p.parse_stars("-60"), Err(InputError::OutOfRange { min: 50, max: 100_000 }));
        assert_eq!(p.parse_stars("abc"), Err(InputError::NotANumber));
        assert_eq!(p.parse_stars("75.5"), Err(InputError::NotANumber));
        assert_eq!(p.parse_stars(""), Err(InputError::NotANumber));
    }

    #[test]
    fn handles_follow_sigil_pattern() {
        assert_eq!(parse_handle("@durov"), Ok("durov".to_string()));
        assert_eq!(parse_handle(" @user_01 "), Ok("user_01".to_string()));
        assert_eq!(parse_handle("durov"), Err(InputError::MissingSigil));
        assert_eq!(parse_handle("@"), Err(InputError::EmptyHandle));
        assert_eq!(parse_handle("@bad-name"), Err(InputError::InvalidHandleChars));
        assert_eq!(parse_handle("@two words"), Err(InputError::InvalidHandleChars));
        assert_eq!(parse_handle("@имя"), Err(InputError::InvalidHandleChars));
        assert_eq!(parse_handle("@@x"), Err(InputError::InvalidHandleChars));
    }
}
