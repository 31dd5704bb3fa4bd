//! Stock level classification.

use serde::{Deserialize, Serialize};

/// How close an item is to running out. Ordered from best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockLevel {
    #[default]
    Healthy,

    /// At or below the reorder level.
    Low,

    /// Nothing available.
    OutOfStock,
}

impl StockLevel {
    /// Classifies an available quantity against a reorder level.
    pub fn classify(available: u32, reorder_level: u32) -> Self {
        if available == 0 {
            StockLevel::OutOfStock
        } else if available <= reorder_level {
            StockLevel::Low
        } else {
            StockLevel::Healthy
        }
    }

    /// Returns the level reached if it is worse than `before`.
    pub fn crossed_from(before: StockLevel, after: StockLevel) -> Option<StockLevel> {
        (after > before).then_some(after)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockLevel::Healthy => "HEALTHY",
            StockLevel::Low => "LOW",
            StockLevel::OutOfStock => "OUT_OF_STOCK",
        }
    }
}

impl std::fmt::Display for StockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        assert_eq!(StockLevel::classify(0, 5), StockLevel::OutOfStock);
        assert_eq!(StockLevel::classify(0, 0), StockLevel::OutOfStock);
        assert_eq!(StockLevel::classify(5, 5), StockLevel::Low);
        assert_eq!(StockLevel::classify(6, 5), StockLevel::Healthy);
    }

    #[test]
    fn only_worsening_counts_as_a_crossing() {
        assert_eq!(
            StockLevel::crossed_from(StockLevel::Healthy, StockLevel::Low),
            Some(StockLevel::Low)
        );
        assert_eq!(
            StockLevel::crossed_from(StockLevel::Low, StockLevel::OutOfStock),
            Some(StockLevel::OutOfStock)
        );
        assert_eq!(StockLevel::crossed_from(StockLevel::Low, StockLevel::Low), None);
        assert_eq!(
            StockLevel::crossed_from(StockLevel::OutOfStock, StockLevel::Healthy),
            None
        );
    }
}
