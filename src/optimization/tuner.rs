//! Weight tuning for scene match weights.
//!
//! Manual adjustments replace a scene's weights and record the change with a
//! performance snapshot so it can be evaluated later. The auto-tuner reads
//! recent negative feedback tags, maps the dominant one to a scoring
//! dimension through an [`IssueClassifier`] and bumps that dimension.

use crate::config::{EngineConfig, TuningSettings};
use crate::error::{AffinityError, Result};
use crate::matching::MatchingService;
use crate::optimization::performance::PerformanceEvaluator;
use crate::storage::{AdjustmentStore, FeedbackStore};
use crate::types::{AdjustmentId, Dimension, FeedbackRecord, MatchWeights, Scene, WeightAdjustment};
use crate::utils::window_start;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Problem category a negative feedback tag points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PersonalityMismatch,
    InterestMismatch,
    EmotionDesync,
}

impl IssueKind {
    /// Dimension whose weight the auto-tuner raises for this issue
    pub fn dimension(&self) -> Dimension {
        match self {
            IssueKind::PersonalityMismatch => Dimension::Personality,
            IssueKind::InterestMismatch => Dimension::Interest,
            IssueKind::EmotionDesync => Dimension::Emotion,
        }
    }

    /// Label used in adjustment reasons
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::PersonalityMismatch => "人格匹配",
            IssueKind::InterestMismatch => "兴趣匹配",
            IssueKind::EmotionDesync => "情感同步",
        }
    }
}

/// Maps a free-text negative tag to an issue
pub trait IssueClassifier: Send + Sync {
    fn classify(&self, tag: &str) -> Option<IssueKind>;
}

/// Substring rules, checked in order
pub struct KeywordIssueClassifier {
    rules: Vec<(IssueKind, Vec<String>)>,
}

impl KeywordIssueClassifier {
    pub fn new(rules: Vec<(IssueKind, Vec<String>)>) -> Self {
        Self { rules }
    }
}

impl Default for KeywordIssueClassifier {
    fn default() -> Self {
        let rule = |kind, words: [&str; 2]| (kind, words.iter().map(|w| w.to_string()).collect());
        Self::new(vec![
            rule(IssueKind::PersonalityMismatch, ["人格", "性格"]),
            rule(IssueKind::InterestMismatch, ["兴趣", "话题"]),
            rule(IssueKind::EmotionDesync, ["情绪", "情感"]),
        ])
    }
}

impl IssueClassifier for KeywordIssueClassifier {
    fn classify(&self, tag: &str) -> Option<IssueKind> {
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| tag.contains(k.as_str())))
            .map(|(kind, _)| *kind)
    }
}

/// Most frequent negative tag across records; ties go to the tag seen first
fn dominant_negative_tag(records: &[FeedbackRecord]) -> Option<(&str, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in records.iter().flat_map(|r| r.negative_aspects.iter()) {
        let count = counts.entry(tag.as_str()).or_insert(0);
        if *count == 0 {
            order.push(tag.as_str());
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for tag in order {
        let count = counts[tag];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((tag, count));
        }
    }
    best
}

/// Applies, records and evaluates weight changes
pub struct WeightTuner {
    matching: Arc<MatchingService>,
    evaluator: Arc<PerformanceEvaluator>,
    feedback: Arc<dyn FeedbackStore>,
    adjustments: Arc<dyn AdjustmentStore>,
    classifier: Box<dyn IssueClassifier>,
    settings: TuningSettings,
    window_days: i64,
}

impl WeightTuner {
    pub fn new(
        matching: Arc<MatchingService>,
        evaluator: Arc<PerformanceEvaluator>,
        feedback: Arc<dyn FeedbackStore>,
        adjustments: Arc<dyn AdjustmentStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            matching,
            evaluator,
            feedback,
            adjustments,
            classifier: Box::new(KeywordIssueClassifier::default()),
            settings: config.tuning.clone(),
            window_days: config.performance.window_days,
        }
    }

    /// Replace the tag classifier used by [`Self::auto_adjust_weights`]
    pub fn with_classifier(mut self, classifier: Box<dyn IssueClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace a scene's weights and record the change
    ///
    /// Fails without recording anything if the new weights do not sum to 1.0.
    pub async fn adjust_weights(
        &self,
        scene: Scene,
        new_weights: MatchWeights,
        reason: impl Into<String>,
    ) -> Result<WeightAdjustment> {
        let old_weights = self.matching.get_scene_config(scene).await?.match_weights;
        let performance_before = self.evaluator.score(scene, self.window_days).await?;

        self.matching.update_match_weights(scene, new_weights).await?;

        let adjustment = WeightAdjustment {
            adjustment_id: AdjustmentId::new(),
            scene,
            old_weights,
            new_weights,
            reason: reason.into(),
            performance_before,
            performance_after: None,
            created_at: Utc::now(),
            evaluated_at: None,
        };
        self.adjustments.insert(&adjustment).await?;

        info!(
            "Adjusted weights for scene {}: {}",
            scene, adjustment.reason
        );
        Ok(adjustment)
    }

    /// Record current performance against an earlier adjustment
    ///
    /// Evaluating again overwrites the previous evaluation.
    pub async fn evaluate_weight_adjustment(
        &self,
        adjustment_id: &AdjustmentId,
    ) -> Result<WeightAdjustment> {
        let mut adjustment = self.adjustments.get(adjustment_id).await?.ok_or_else(|| {
            AffinityError::not_found(format!("Weight adjustment not found: {}", adjustment_id))
        })?;

        let performance_after = self.evaluator.score(adjustment.scene, self.window_days).await?;
        adjustment.performance_after = Some(performance_after);
        adjustment.evaluated_at = Some(Utc::now());
        self.adjustments.update(&adjustment).await?;

        info!(
            "Evaluated weight adjustment {}: {} -> {}",
            adjustment_id, adjustment.performance_before, performance_after
        );
        Ok(adjustment)
    }

    /// Raise the weight of the dimension recent complaints point at
    ///
    /// Returns `None` when there is too little feedback, no tag is frequent
    /// enough, the tag is not recognized or the dimension is above the cap.
    /// A dimension sitting exactly at the cap still records an adjustment.
    pub async fn auto_adjust_weights(&self, scene: Scene) -> Result<Option<WeightAdjustment>> {
        let start = window_start(Utc::now(), self.window_days)?;
        let records = self.feedback.list_by_scene(scene, Some(start), None).await?;

        if records.len() < self.settings.min_feedback {
            debug!(
                "Not enough feedback to auto-adjust scene {}: {} < {}",
                scene,
                records.len(),
                self.settings.min_feedback
            );
            return Ok(None);
        }

        let Some((tag, count)) = dominant_negative_tag(&records) else {
            debug!("No negative feedback tags for scene {}", scene);
            return Ok(None);
        };

        if (count as f64) < records.len() as f64 * self.settings.issue_share_threshold {
            debug!(
                "Top issue '{}' ({} of {}) below threshold for scene {}",
                tag,
                count,
                records.len(),
                scene
            );
            return Ok(None);
        }

        let Some(issue) = self.classifier.classify(tag) else {
            debug!("Unrecognized issue tag '{}' for scene {}", tag, scene);
            return Ok(None);
        };

        let dimension = issue.dimension();
        let mut weights = self.matching.get_scene_config(scene).await?.match_weights;
        let current = weights.get(dimension);
        // Capping would lower a weight set above the cap by hand
        if current > self.settings.weight_cap {
            info!(
                "Weight for {} in scene {} above cap ({}), skipping",
                dimension, scene, current
            );
            return Ok(None);
        }

        weights.set(
            dimension,
            (current + self.settings.weight_step).min(self.settings.weight_cap),
        );
        let reason = format!("自动调整：用户反馈{}问题（{}次）", issue.label(), count);

        self.adjust_weights(scene, weights.normalized(), reason)
            .await
            .map(Some)
    }

    /// Adjustments for a scene created at or after `since`
    pub async fn list_adjustments(
        &self,
        scene: Scene,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WeightAdjustment>> {
        self.adjustments.list_by_scene(scene, since).await
    }
}
