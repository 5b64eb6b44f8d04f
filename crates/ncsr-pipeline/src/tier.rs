use std::time::Duration;

use ncsr_core::{AppError, AppResult, ProcessingTier, Settings};

/// **Tier Router**
///
/// Pure size-to-tier mapping over three ascending thresholds. The tier
/// decides how much work the pipeline does per filing and how long the parse
/// phase may run:
///
/// - size ≤ small      → standard (full extraction, 300 s)
/// - small < size ≤ med → limited (top tables only, 120 s)
/// - med < size ≤ large → minimal (key metrics only, 60 s)
/// - size > large       → dead_letter (never attempted)
#[derive(Debug, Clone)]
pub struct TierRouter {
    small_threshold: f64,
    medium_threshold: f64,
    large_threshold: f64,
    timeout_standard: u64,
    timeout_limited: u64,
    timeout_minimal: u64,
}

impl TierRouter {
    pub fn new(
        small_threshold: f64,
        medium_threshold: f64,
        large_threshold: f64,
        timeout_standard: u64,
        timeout_limited: u64,
        timeout_minimal: u64,
    ) -> AppResult<Self> {
        if !(0.0 < small_threshold
            && small_threshold < medium_threshold
            && medium_threshold < large_threshold)
        {
            return Err(AppError::config_error(
                "Tier thresholds must be strictly ascending",
            ));
        }

        Ok(Self {
            small_threshold,
            medium_threshold,
            large_threshold,
            timeout_standard,
            timeout_limited,
            timeout_minimal,
        })
    }

    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Self::new(
            settings.small_file_threshold,
            settings.medium_file_threshold,
            settings.large_file_threshold,
            settings.timeout_standard,
            settings.timeout_limited,
            settings.timeout_minimal,
        )
    }

    /// Map a reported size in megabytes to a processing tier
    pub fn tier_for(&self, file_size_mb: f64) -> ProcessingTier {
        if file_size_mb > self.large_threshold {
            ProcessingTier::DeadLetter
        } else if file_size_mb > self.medium_threshold {
            ProcessingTier::Minimal
        } else if file_size_mb > self.small_threshold {
            ProcessingTier::Limited
        } else {
            ProcessingTier::Standard
        }
    }

    /// Parse timeout for a tier; dead_letter is never parsed
    pub fn timeout_for(&self, tier: ProcessingTier) -> Duration {
        let seconds = match tier {
            ProcessingTier::Standard => self.timeout_standard,
            ProcessingTier::Limited => self.timeout_limited,
            ProcessingTier::Minimal => self.timeout_minimal,
            ProcessingTier::DeadLetter => 0,
        };
        Duration::from_secs(seconds)
    }

    /// The threshold above which filings are never attempted
    pub fn large_threshold(&self) -> f64 {
        self.large_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn default_router() -> TierRouter {
        TierRouter::new(10.0, 50.0, 100.0, 300, 120, 60).expect("valid thresholds")
    }

    #[rstest]
    #[case(0.0, ProcessingTier::Standard)]
    #[case(3.2, ProcessingTier::Standard)]
    #[case(10.0, ProcessingTier::Standard)]
    #[case(10.1, ProcessingTier::Limited)]
    #[case(50.0, ProcessingTier::Limited)]
    #[case(50.1, ProcessingTier::Minimal)]
    #[case(60.0, ProcessingTier::Minimal)]
    #[case(100.0, ProcessingTier::Minimal)]
    #[case(100.1, ProcessingTier::DeadLetter)]
    #[case(120.0, ProcessingTier::DeadLetter)]
    fn test_tier_routing(#[case] size_mb: f64, #[case] expected: ProcessingTier) {
        // REQUIREMENT: Exactly-on-threshold sizes use strictly-greater
        // comparisons: 10.0 → standard, 50.0 → limited, 100.0 → minimal
        assert_eq!(default_router().tier_for(size_mb), expected);
    }

    #[test]
    fn test_timeouts_per_tier() {
        let router = default_router();
        assert_eq!(
            router.timeout_for(ProcessingTier::Standard),
            Duration::from_secs(300)
        );
        assert_eq!(
            router.timeout_for(ProcessingTier::Limited),
            Duration::from_secs(120)
        );
        assert_eq!(
            router.timeout_for(ProcessingTier::Minimal),
            Duration::from_secs(60)
        );
        assert_eq!(
            router.timeout_for(ProcessingTier::DeadLetter),
            Duration::ZERO
        );
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        assert!(TierRouter::new(50.0, 10.0, 100.0, 300, 120, 60).is_err());
        assert!(TierRouter::new(10.0, 10.0, 100.0, 300, 120, 60).is_err());
        assert!(TierRouter::new(0.0, 50.0, 100.0, 300, 120, 60).is_err());
    }

    #[test]
    fn test_every_size_maps_to_a_tier() {
        // Work per byte is monotonic non-increasing as size grows
        let router = default_router();
        let order = |t: ProcessingTier| match t {
            ProcessingTier::Standard => 3,
            ProcessingTier::Limited => 2,
            ProcessingTier::Minimal => 1,
            ProcessingTier::DeadLetter => 0,
        };

        let mut previous = 3;
        for size in (0..2000).map(|i| i as f64 * 0.1) {
            let rank = order(router.tier_for(size));
            assert!(rank <= previous, "work rank increased at {} MB", size);
            previous = rank;
        }
    }
}
