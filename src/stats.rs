//! Two-proportion significance testing for A/B variants.

use serde::Serialize;

/// Confidence required before a difference is reported as significant.
pub const SIGNIFICANCE_CONFIDENCE: f64 = 0.95;

/// Engagement rate gap (absolute, 0.01 = one percentage point) required for
/// an owner notification.
pub const MIN_ENGAGEMENT_GAP: f64 = 0.01;

/// Combined views required for an owner notification.
pub const MIN_TOTAL_VIEWS: i64 = 1_000;

/// Standard normal CDF, Abramowitz & Stegun 26.2.17 (|error| < 7.5e-8).
pub fn normal_cdf(x: f64) -> f64 {
    const P: f64 = 0.231_641_9;
    const B1: f64 = 0.319_381_530;
    const B2: f64 = -0.356_563_782;
    const B3: f64 = 1.781_477_937;
    const B4: f64 = -1.821_255_978;
    const B5: f64 = 1.330_274_429;

    let z = x.abs();
    let t = 1.0 / (1.0 + P * z);
    let pdf = (-z * z / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let poly = t * (B1 + t * (B2 + t * (B3 + t * (B4 + t * B5))));
    let upper = pdf * poly;
    if x >= 0.0 {
        1.0 - upper
    } else {
        upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProportionTest {
    pub rate_a: f64,
    pub rate_b: f64,
    pub pooled_rate: f64,
    pub standard_error: f64,
    pub z_score: f64,
    /// Two-sided: `2 * cdf(|z|) - 1`.
    pub confidence: f64,
}

impl ProportionTest {
    pub fn is_significant(&self) -> bool {
        self.confidence >= SIGNIFICANCE_CONFIDENCE
    }
}

/// Pooled two-proportion Z-test of `successes_a / trials_a` against
/// `successes_b / trials_b`. `None` when either side has no trials or the
/// pooled rate leaves no variance.
pub fn two_proportion_z_test(
    successes_a: i64,
    trials_a: i64,
    successes_b: i64,
    trials_b: i64,
) -> Option<ProportionTest> {
    if trials_a <= 0 || trials_b <= 0 {
        return None;
    }
    let (na, nb) = (trials_a as f64, trials_b as f64);
    let rate_a = successes_a as f64 / na;
    let rate_b = successes_b as f64 / nb;
    let pooled_rate = (successes_a + successes_b) as f64 / (na + nb);
    let standard_error = (pooled_rate * (1.0 - pooled_rate) * (1.0 / na + 1.0 / nb)).sqrt();
    if !standard_error.is_finite() || standard_error <= 0.0 {
        return None;
    }
    let z_score = (rate_a - rate_b) / standard_error;
    let confidence = (2.0 * normal_cdf(z_score.abs()) - 1.0).clamp(0.0, 1.0);
    Some(ProportionTest {
        rate_a,
        rate_b,
        pooled_rate,
        standard_error,
        z_score,
        confidence,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngagementSample {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

impl EngagementSample {
    pub fn engagements(&self) -> i64 {
        self.likes + self.comments
    }

    pub fn rate(&self) -> f64 {
        if self.views <= 0 {
            0.0
        } else {
            self.engagements() as f64 / self.views as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngagementSignal {
    pub test: ProportionTest,
    pub rate_gap: f64,
    pub total_views: i64,
    pub notify: bool,
}

/// Engagement comparison between two variants. `notify` is set when the
/// difference is significant, the rate gap exceeds [`MIN_ENGAGEMENT_GAP`]
/// and the combined views exceed [`MIN_TOTAL_VIEWS`].
pub fn engagement_signal(a: &EngagementSample, b: &EngagementSample) -> Option<EngagementSignal> {
    let test = two_proportion_z_test(a.engagements(), a.views, b.engagements(), b.views)?;
    let rate_gap = (test.rate_a - test.rate_b).abs();
    let total_views = a.views + b.views;
    let notify =
        test.is_significant() && rate_gap > MIN_ENGAGEMENT_GAP && total_views > MIN_TOTAL_VIEWS;
    Some(EngagementSignal {
        test,
        rate_gap,
        total_views,
        notify,
    })
}
