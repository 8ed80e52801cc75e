//! Scene performance from recent feedback.

use crate::error::Result;
use crate::optimization::feedback::{MAX_QUALITY, MAX_SATISFACTION};
use crate::storage::{FeedbackStore, MatchRepository};
use crate::types::{FeedbackRecord, PerformanceMetrics, Scene};
use crate::utils::{mean, round2, window_start};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Score reported when a scene has no feedback in the window
pub const NEUTRAL_PERFORMANCE: f64 = 50.0;

const SATISFACTION_WEIGHT: f64 = 0.4;
const QUALITY_WEIGHT: f64 = 0.4;
const ACCURACY_WEIGHT: f64 = 0.2;

/// Aggregates feedback into per-scene performance figures
pub struct PerformanceEvaluator {
    feedback: Arc<dyn FeedbackStore>,
    matches: Arc<dyn MatchRepository>,
}

/// Unrounded feedback means over a window
///
/// All zero when the window holds no feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedbackAverages {
    pub satisfaction: f64,
    pub quality: f64,
    pub accuracy: f64,
    pub feedbacks: usize,
}

impl FeedbackAverages {
    fn of(records: &[FeedbackRecord]) -> Option<Self> {
        Some(Self {
            satisfaction: mean(records.iter().map(|r| r.satisfaction_score))?,
            quality: mean(records.iter().map(|r| r.conversation_quality))?,
            accuracy: mean(records.iter().map(|r| r.match_accuracy))?,
            feedbacks: records.len(),
        })
    }

    /// Weighted blend of the three normalized means, on a 0-100 scale
    fn performance_score(&self) -> f64 {
        round2(
            100.0
                * (SATISFACTION_WEIGHT * self.satisfaction / MAX_SATISFACTION
                    + QUALITY_WEIGHT * self.quality / MAX_QUALITY
                    + ACCURACY_WEIGHT * self.accuracy / MAX_SATISFACTION),
        )
    }
}

impl PerformanceEvaluator {
    pub fn new(feedback: Arc<dyn FeedbackStore>, matches: Arc<dyn MatchRepository>) -> Self {
        Self { feedback, matches }
    }

    /// Performance score over the trailing `window_days`
    pub async fn score(&self, scene: Scene, window_days: i64) -> Result<f64> {
        let start = window_start(Utc::now(), window_days)?;
        let records = self.feedback.list_by_scene(scene, Some(start), None).await?;

        let score = FeedbackAverages::of(&records)
            .map(|averages| averages.performance_score())
            .unwrap_or(NEUTRAL_PERFORMANCE);
        debug!(
            "Performance for scene {} over {} days: {} ({} records)",
            scene,
            window_days,
            score,
            records.len()
        );
        Ok(score)
    }

    /// Full metrics for the trailing `period_days`
    ///
    /// `avg_match_score` is the mean score of the stored matches the
    /// feedback refers to; matches the repository no longer knows are
    /// skipped.
    pub async fn calculate_performance_metrics(
        &self,
        scene: Scene,
        period_days: i64,
    ) -> Result<PerformanceMetrics> {
        self.summarize(scene, period_days)
            .await
            .map(|(metrics, _)| metrics)
    }

    /// Metrics plus the unrounded means they were built from
    pub async fn summarize(
        &self,
        scene: Scene,
        period_days: i64,
    ) -> Result<(PerformanceMetrics, FeedbackAverages)> {
        let period_end = Utc::now();
        let period_start = window_start(period_end, period_days)?;
        let records = self
            .feedback
            .list_by_scene(scene, Some(period_start), Some(period_end))
            .await?;

        let Some(averages) = FeedbackAverages::of(&records) else {
            let empty = PerformanceMetrics {
                scene,
                period_start,
                period_end,
                total_matches: 0,
                avg_match_score: 0.0,
                total_feedbacks: 0,
                avg_satisfaction: 0.0,
                avg_conversation_quality: 0.0,
                avg_match_accuracy: 0.0,
                performance_score: NEUTRAL_PERFORMANCE,
            };
            return Ok((empty, FeedbackAverages::default()));
        };

        let mut seen = HashSet::new();
        let mut match_scores = Vec::new();
        for record in &records {
            if !seen.insert(record.match_id) {
                continue;
            }
            if let Some(found) = self.matches.get_match(&record.match_id).await? {
                match_scores.push(found.match_score);
            }
        }

        let metrics = PerformanceMetrics {
            scene,
            period_start,
            period_end,
            total_matches: seen.len(),
            avg_match_score: round2(mean(match_scores).unwrap_or(0.0)),
            total_feedbacks: records.len(),
            avg_satisfaction: round2(averages.satisfaction),
            avg_conversation_quality: round2(averages.quality),
            avg_match_accuracy: round2(averages.accuracy),
            performance_score: averages.performance_score(),
        };
        Ok((metrics, averages))
    }
}
