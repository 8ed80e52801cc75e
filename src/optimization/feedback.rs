//! Feedback collection for matched conversations.
//!
//! Users rate a conversation on three scales and may tag what went well or
//! badly. Records are append-only; the performance evaluator and the
//! auto-tuner read them back by scene and time window.

use crate::error::{AffinityError, Result};
use crate::storage::FeedbackStore;
use crate::types::{FeedbackId, FeedbackRecord, NewFeedback, Scene};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound of the satisfaction and accuracy scales
pub const MAX_SATISFACTION: f64 = 5.0;
/// Upper bound of the conversation quality scale
pub const MAX_QUALITY: f64 = 10.0;

/// Validates and stores user feedback
pub struct FeedbackCollector {
    store: Arc<dyn FeedbackStore>,
}

impl FeedbackCollector {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store }
    }

    /// Validate a submission, assign it an id and append it
    pub async fn collect_feedback(&self, feedback: NewFeedback) -> Result<FeedbackRecord> {
        check_range(
            feedback.satisfaction_score,
            MAX_SATISFACTION,
            "Satisfaction score must be between 0 and 5",
        )?;
        check_range(
            feedback.conversation_quality,
            MAX_QUALITY,
            "Conversation quality must be between 0 and 10",
        )?;
        check_range(
            feedback.match_accuracy,
            MAX_SATISFACTION,
            "Match accuracy must be between 0 and 5",
        )?;

        let record = FeedbackRecord {
            feedback_id: FeedbackId::new(),
            user_id: feedback.user_id,
            match_id: feedback.match_id,
            scene: feedback.scene,
            satisfaction_score: feedback.satisfaction_score,
            conversation_quality: feedback.conversation_quality,
            match_accuracy: feedback.match_accuracy,
            positive_aspects: feedback.positive_aspects,
            negative_aspects: feedback.negative_aspects,
            suggestions: feedback.suggestions,
            created_at: Utc::now(),
        };

        self.store.append(&record).await?;
        info!(
            "Collected feedback {} from user {} for match {}",
            record.feedback_id, record.user_id, record.match_id
        );
        Ok(record)
    }

    pub async fn get_feedback(&self, feedback_id: &FeedbackId) -> Result<FeedbackRecord> {
        self.store.get(feedback_id).await?.ok_or_else(|| {
            AffinityError::not_found(format!("Feedback not found: {}", feedback_id))
        })
    }

    /// Feedback for a scene within optional inclusive bounds, oldest first
    pub async fn get_feedbacks_by_scene(
        &self,
        scene: Scene,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>> {
        let records = self.store.list_by_scene(scene, start, end).await?;
        debug!("Loaded {} feedback records for scene {}", records.len(), scene);
        Ok(records)
    }
}

/// Reject values outside `[0, max]`, NaN included
fn check_range(value: f64, max: f64, message: &str) -> Result<()> {
    if (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(AffinityError::validation(message))
    }
}
