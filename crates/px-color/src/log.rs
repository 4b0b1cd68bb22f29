//! Cineon-style logarithmic encoding.
//!
//! Linear values map onto 10-bit printing density code values between
//! reference black and reference white, stored as `code / 1024`.
//!
//! # Parameters
//!
//! Read from image properties, with defaults:
//!
//! | Property          | Default |
//! |-------------------|---------|
//! | `gamma`           | 1.7     |
//! | `film-gamma`      | 0.6     |
//! | `reference-black` | 95      |
//! | `reference-white` | 685     |

use std::collections::BTreeMap;

use px_core::{Error, Result};
use tracing::debug;

const DISPLAY_GAMMA: f64 = 1.7;

/// Density change per code value.
const DENSITY_PER_CODE: f64 = 0.002;

/// Log encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogParams {
    /// Display gamma
    pub gamma: f64,
    /// Film negative gamma
    pub film_gamma: f64,
    /// Code value of reference black
    pub reference_black: f64,
    /// Code value of reference white
    pub reference_white: f64,
}

impl Default for LogParams {
    fn default() -> Self {
        Self {
            gamma: DISPLAY_GAMMA,
            film_gamma: 0.6,
            reference_black: 95.0,
            reference_white: 685.0,
        }
    }
}

impl LogParams {
    /// Reads parameters from image properties; missing ones keep defaults.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        let mut params = Self::default();
        for (name, slot) in [
            ("gamma", &mut params.gamma),
            ("film-gamma", &mut params.film_gamma),
            ("reference-black", &mut params.reference_black),
            ("reference-white", &mut params.reference_white),
        ] {
            if let Some(value) = properties.get(name) {
                *slot = value.trim().parse().map_err(|_| {
                    Error::invalid_argument(format!("property {name}={value:?} is not a number"))
                })?;
            }
        }
        params.validate()?;
        debug!(?params, "log parameters");
        Ok(params)
    }

    /// Checks that the curve is well defined.
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0) || !(self.film_gamma > 0.0) {
            return Err(Error::invalid_argument("log gamma and film gamma must be positive"));
        }
        if !(self.reference_white > self.reference_black) {
            return Err(Error::invalid_argument(
                "log reference white must exceed reference black",
            ));
        }
        Ok(())
    }

    #[inline]
    fn step(&self) -> f64 {
        (DISPLAY_GAMMA / self.gamma) * DENSITY_PER_CODE / self.film_gamma
    }

    #[inline]
    fn black(&self) -> f64 {
        10f64.powf((self.reference_black - self.reference_white) * self.step())
    }

    /// Linear `[0, 1]` to log code `[0, 1]`.
    pub fn encode(&self, linear: f64) -> f64 {
        let black = self.black();
        let v = black + linear.clamp(0.0, 1.0) * (1.0 - black);
        ((self.reference_white + v.log10() / self.step()) / 1024.0).clamp(0.0, 1.0)
    }

    /// Log code `[0, 1]` to linear `[0, 1]`.
    pub fn decode(&self, code: f64) -> f64 {
        let black = self.black();
        let v = 10f64.powf((code * 1024.0 - self.reference_white) * self.step());
        ((v - black) / (1.0 - black)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_points() {
        let params = LogParams::default();
        assert_relative_eq!(params.encode(0.0), 95.0 / 1024.0, epsilon = 1e-12);
        assert_relative_eq!(params.encode(1.0), 685.0 / 1024.0, epsilon = 1e-12);
        for i in 0..=20 {
            let v = i as f64 / 20.0;
            assert_relative_eq!(params.decode(params.encode(v)), v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_properties() {
        let mut props = BTreeMap::new();
        props.insert("reference-white".to_string(), "700".to_string());
        props.insert("gamma".to_string(), " 2.2 ".to_string());
        let params = LogParams::from_properties(&props).unwrap();
        assert_eq!(params.reference_white, 700.0);
        assert_eq!(params.gamma, 2.2);
        assert_eq!(params.film_gamma, 0.6);

        props.insert("reference-black".to_string(), "800".to_string());
        assert!(LogParams::from_properties(&props).is_err());
        props.insert("reference-black".to_string(), "dark".to_string());
        assert!(LogParams::from_properties(&props).is_err());
    }
}
