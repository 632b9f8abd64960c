//! Band arithmetic and raw-score conversion tables.

use serde::{Deserialize, Serialize};

pub const MIN_BAND: f64 = 0.0;
pub const MAX_BAND: f64 = 9.0;

/// Round to the nearest half band. Halves round away from zero, so 6.25
/// becomes 6.5 and 6.75 becomes 7.0.
pub fn round_to_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

/// Clamp to [0, 9] and round to the nearest half band.
pub fn normalize_band(value: f64) -> f64 {
    round_to_half(value.clamp(MIN_BAND, MAX_BAND))
}

pub fn is_valid_band(value: f64) -> bool {
    (MIN_BAND..=MAX_BAND).contains(&value) && (value * 2.0).fract() == 0.0
}

/// One row of a conversion table: raw scores `min..=max` map to `band`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub min: u32,
    pub max: u32,
    pub band: f64,
}

impl BandRange {
    pub fn contains(&self, raw: u32) -> bool {
        (self.min..=self.max).contains(&raw)
    }
}

/// Ordered raw-score → band table for one test form.
///
/// Lookup walks the rows in order and the first containing row wins, so
/// overlapping rows resolve deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandTable {
    ranges: Vec<BandRange>,
}

impl BandTable {
    pub fn new(ranges: Vec<BandRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[BandRange] {
        &self.ranges
    }

    /// Band for a raw score, or 0 when no row covers it.
    pub fn lookup(&self, raw: u32) -> f64 {
        self.ranges
            .iter()
            .find(|r| r.contains(raw))
            .map(|r| r.band)
            .unwrap_or(0.0)
    }

    /// Structural check. `max_raw` is the module's question count.
    pub fn validate(&self, max_raw: u32) -> Result<(), String> {
        if self.ranges.is_empty() {
            return Err("table is empty".into());
        }
        for (i, r) in self.ranges.iter().enumerate() {
            if r.min > r.max {
                return Err(format!("row {i}: min {} > max {}", r.min, r.max));
            }
            if r.max > max_raw {
                return Err(format!("row {i}: max {} exceeds {max_raw}", r.max));
            }
            if !is_valid_band(r.band) {
                return Err(format!(
                    "row {i}: band {} is not a half step in 0-9",
                    r.band
                ));
            }
        }
        Ok(())
    }

    /// Raw scores no row covers. Not an error (they convert to 0), but
    /// usually a typo in the table.
    pub fn gaps(&self, max_raw: u32) -> Vec<u32> {
        (0..=max_raw)
            .filter(|raw| !self.ranges.iter().any(|r| r.contains(*raw)))
            .collect()
    }

    /// Whether a higher raw score never yields a lower band.
    pub fn is_monotonic(&self, max_raw: u32) -> bool {
        let bands: Vec<f64> = (0..=max_raw).map(|raw| self.lookup(raw)).collect();
        bands.windows(2).all(|w| w[0] <= w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(u32, u32, f64)]) -> BandTable {
        BandTable::new(
            rows.iter()
                .map(|&(min, max, band)| BandRange { min, max, band })
                .collect(),
        )
    }

    #[test]
    fn rounding_to_half_steps() {
        assert_eq!(round_to_half(6.2), 6.0);
        assert_eq!(round_to_half(6.25), 6.5);
        assert_eq!(round_to_half(6.74), 6.5);
        assert_eq!(round_to_half(6.75), 7.0);
        assert_eq!(normalize_band(11.3), 9.0);
        assert_eq!(normalize_band(-2.0), 0.0);
    }

    #[test]
    fn lookup_first_match_then_fallthrough() {
        let t = table(&[(39, 40, 9.0), (37, 38, 8.5)]);
        assert_eq!(t.lookup(39), 9.0);
        assert_eq!(t.lookup(38), 8.5);
        assert_eq!(t.lookup(36), 0.0);

        let t = table(&[(39, 40, 9.0), (37, 38, 8.5), (0, 36, 5.0)]);
        assert_eq!(t.lookup(36), 5.0);
    }

    #[test]
    fn overlapping_rows_pick_first() {
        let t = table(&[(30, 35, 7.0), (33, 40, 8.0)]);
        assert_eq!(t.lookup(34), 7.0);
        assert_eq!(t.lookup(36), 8.0);
    }

    #[test]
    fn validation_and_lint() {
        assert!(table(&[]).validate(40).is_err());
        assert!(table(&[(5, 2, 3.0)]).validate(40).is_err());
        assert!(table(&[(0, 41, 3.0)]).validate(40).is_err());
        assert!(table(&[(0, 40, 3.3)]).validate(40).is_err());

        let t = table(&[(0, 10, 2.0), (20, 40, 6.0)]);
        assert!(t.validate(40).is_ok());
        assert_eq!(t.gaps(40), (11..20).collect::<Vec<_>>());
        assert!(!t.is_monotonic(40));
        assert!(table(&[(0, 20, 4.0), (21, 40, 6.0)]).is_monotonic(40));
    }

    #[test]
    fn serializes_as_plain_list() {
        let t = table(&[(39, 40, 9.0)]);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"[{"min":39,"max":40,"band":9.0}]"#);
    }
}
