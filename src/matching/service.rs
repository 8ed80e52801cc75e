//! Matching service: scores pairs, proposes matches and manages their status.

use crate::error::{AffinityError, Result};
use crate::matching::reason::{match_reason, FALLBACK_REASON};
use crate::matching::scorer;
use crate::storage::{MatchRepository, ProfileProvider, SceneRegistry};
use crate::types::{
    Match, MatchId, MatchStatus, MatchWeights, Scene, SceneConfig, ScoreBreakdown, UserId,
};
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scores user pairs against the scene registry and records proposed matches
pub struct MatchingService {
    profiles: Arc<dyn ProfileProvider>,
    scenes: Arc<dyn SceneRegistry>,
    matches: Arc<dyn MatchRepository>,
}

impl MatchingService {
    pub fn new(
        profiles: Arc<dyn ProfileProvider>,
        scenes: Arc<dyn SceneRegistry>,
        matches: Arc<dyn MatchRepository>,
    ) -> Self {
        Self {
            profiles,
            scenes,
            matches,
        }
    }

    /// Score two users with the scene's current weights
    pub async fn calculate_match_score(
        &self,
        user_a_id: &UserId,
        user_b_id: &UserId,
        scene: Scene,
    ) -> Result<ScoreBreakdown> {
        let config = self.scenes.get_scene_config(scene).await?;
        let profile_a = self.profiles.get_profile(user_a_id).await?;
        let profile_b = self.profiles.get_profile(user_b_id).await?;

        Ok(scorer::score(&profile_a, &profile_b, &config))
    }

    /// Score two users with caller-supplied weights, e.g. an A/B test arm
    pub async fn calculate_match_score_with_weights(
        &self,
        user_a_id: &UserId,
        user_b_id: &UserId,
        scene: Scene,
        weights: &MatchWeights,
    ) -> Result<ScoreBreakdown> {
        // Still resolve the scene so unknown scenes fail the same way
        self.scenes.get_scene_config(scene).await?;
        let profile_a = self.profiles.get_profile(user_a_id).await?;
        let profile_b = self.profiles.get_profile(user_b_id).await?;

        Ok(scorer::score_with_weights(
            &profile_a, &profile_b, scene, weights,
        ))
    }

    /// Rank every other known user for `user_id` and record the top `limit`
    /// as pending matches
    ///
    /// Candidates that cannot be scored are logged and skipped.
    pub async fn find_matches(
        &self,
        user_id: &UserId,
        scene: Scene,
        limit: usize,
    ) -> Result<Vec<Match>> {
        let config = self.scenes.get_scene_config(scene).await?;
        let profile = self.profiles.get_profile(user_id).await?;

        let candidate_ids: Vec<UserId> = self
            .profiles
            .list_user_ids()
            .await?
            .into_iter()
            .filter(|candidate| candidate != user_id)
            .collect();

        let mut scored = Vec::with_capacity(candidate_ids.len());
        for candidate_id in candidate_ids {
            let candidate = match self.profiles.get_profile(&candidate_id).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(
                        "Failed to create match between {} and {}: {}",
                        user_id, candidate_id, e
                    );
                    continue;
                }
            };

            let breakdown = scorer::score(&profile, &candidate, &config);
            scored.push(Match {
                match_id: MatchId::new(),
                user_a_id: user_id.clone(),
                user_b_id: candidate_id,
                scene,
                match_score: breakdown.composite,
                personality_score: breakdown.personality,
                interest_score: breakdown.interest,
                scene_score: breakdown.scene,
                emotion_sync_score: breakdown.emotion,
                match_reason: match_reason(&profile, &candidate, scene),
                status: MatchStatus::Pending,
                created_at: Utc::now(),
            });
        }

        // Stable sort keeps enumeration order among equal scores
        scored.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(limit);

        for record in &scored {
            self.matches.insert_match(record).await?;
        }

        info!(
            "Found {} matches for user {} in scene {}",
            scored.len(),
            user_id,
            scene
        );
        Ok(scored)
    }

    /// Explain a pairing; falls back to a generic reason if a profile is missing
    pub async fn get_match_reason(
        &self,
        user_a_id: &UserId,
        user_b_id: &UserId,
        scene: Scene,
    ) -> String {
        let profiles = tokio::try_join!(
            self.profiles.get_profile(user_a_id),
            self.profiles.get_profile(user_b_id)
        );
        match profiles {
            Ok((a, b)) => match_reason(&a, &b, scene),
            Err(e) => {
                debug!("No match reason for {} / {}: {}", user_a_id, user_b_id, e);
                FALLBACK_REASON.to_string()
            }
        }
    }

    pub async fn get_match(&self, match_id: &MatchId) -> Result<Match> {
        self.matches
            .get_match(match_id)
            .await?
            .ok_or_else(|| AffinityError::not_found(format!("Match not found: {}", match_id)))
    }

    /// Matches involving the user, newest first
    pub async fn get_match_history(&self, user_id: &UserId, limit: usize) -> Result<Vec<Match>> {
        let mut history = self.matches.list_for_user(user_id).await?;
        history.truncate(limit);
        Ok(history)
    }

    pub async fn accept_match(&self, match_id: &MatchId, user_id: &UserId) -> Result<Match> {
        let updated = self
            .transition(match_id, user_id, MatchStatus::Accepted)
            .await?;
        info!("Match {} accepted by user {}", match_id, user_id);
        Ok(updated)
    }

    pub async fn reject_match(&self, match_id: &MatchId, user_id: &UserId) -> Result<Match> {
        let updated = self
            .transition(match_id, user_id, MatchStatus::Rejected)
            .await?;
        info!("Match {} rejected by user {}", match_id, user_id);
        Ok(updated)
    }

    async fn transition(
        &self,
        match_id: &MatchId,
        user_id: &UserId,
        status: MatchStatus,
    ) -> Result<Match> {
        let existing = self.get_match(match_id).await?;
        if !existing.involves(user_id) {
            return Err(AffinityError::validation(format!(
                "User {} not authorized to update match {}",
                user_id, match_id
            )));
        }

        self.matches
            .update_status(match_id, status)
            .await?
            .ok_or_else(|| AffinityError::not_found(format!("Match not found: {}", match_id)))
    }

    pub async fn get_scene_config(&self, scene: Scene) -> Result<SceneConfig> {
        self.scenes.get_scene_config(scene).await
    }

    pub async fn list_scenes(&self) -> Result<Vec<SceneConfig>> {
        self.scenes.list_scenes().await
    }

    /// Replace a scene's weights after checking they sum to 1.0
    pub async fn update_match_weights(&self, scene: Scene, weights: MatchWeights) -> Result<()> {
        weights.validate("Weights")?;
        self.scenes.set_match_weights(scene, weights).await?;
        info!("Updated match weights for scene: {}", scene);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        InMemoryMatchRepository, InMemoryProfileProvider, InMemorySceneRegistry,
        MockProfileProvider,
    };
    use crate::types::Profile;

    fn service_with(profiles: Arc<dyn ProfileProvider>) -> MatchingService {
        MatchingService::new(
            profiles,
            Arc::new(InMemorySceneRegistry::new()),
            Arc::new(InMemoryMatchRepository::new()),
        )
    }

    fn hobbyist(id: &str, hobbies: &[&str]) -> Profile {
        let mut p = Profile::new(id);
        p.hobby_interests = hobbies.iter().map(|s| s.to_string()).collect();
        p
    }

    #[tokio::test]
    async fn test_find_matches_ranks_and_persists() {
        let provider = Arc::new(InMemoryProfileProvider::with_profiles(vec![
            hobbyist("me", &["篮球", "摄影"]),
            hobbyist("far", &["钢琴"]),
            hobbyist("close", &["篮球", "摄影"]),
            hobbyist("half", &["篮球"]),
        ]));
        let service = service_with(provider);
        let me = UserId::from("me");

        let matches = service
            .find_matches(&me, Scene::InterestCommunity, 2)
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].user_b_id, UserId::from("close"));
        assert_eq!(matches[1].user_b_id, UserId::from("half"));
        assert!(matches.iter().all(|m| m.status == MatchStatus::Pending));
        assert!(matches[0].match_score >= matches[1].match_score);

        let stored = service.get_match(&matches[0].match_id).await.unwrap();
        assert_eq!(stored, matches[0]);
        assert_eq!(service.get_match_history(&me, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_matches_keeps_enumeration_order_on_ties() {
        let provider = Arc::new(InMemoryProfileProvider::with_profiles(vec![
            Profile::new("me"),
            Profile::new("z"),
            Profile::new("a"),
            Profile::new("m"),
        ]));
        let service = service_with(provider);

        let matches = service
            .find_matches(&UserId::from("me"), Scene::TreeHole, 10)
            .await
            .unwrap();
        let order: Vec<&str> = matches.iter().map(|m| m.user_b_id.as_str()).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_find_matches_skips_failing_candidates() {
        let mut provider = MockProfileProvider::new();
        provider
            .expect_list_user_ids()
            .returning(|| Ok(vec!["me".into(), "ghost".into(), "ok".into()]));
        provider.expect_get_profile().returning(|id| {
            if id.as_str() == "ghost" {
                Err(AffinityError::not_found(format!("Profile not found: {}", id)))
            } else {
                Ok(Profile::new(id.as_str()))
            }
        });
        let service = service_with(Arc::new(provider));

        let matches = service
            .find_matches(&UserId::from("me"), Scene::StudyRoom, 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user_b_id, UserId::from("ok"));
    }

    #[tokio::test]
    async fn test_calculate_match_score_unknown_profile() {
        let provider = Arc::new(InMemoryProfileProvider::with_profiles(vec![Profile::new(
            "a",
        )]));
        let service = service_with(provider);

        let err = service
            .calculate_match_score(&"a".into(), &"nobody".into(), Scene::StudyRoom)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            service
                .get_match_reason(&"a".into(), &"nobody".into(), Scene::StudyRoom)
                .await,
            FALLBACK_REASON
        );
    }

    #[tokio::test]
    async fn test_accept_and_reject_require_participant() {
        let provider = Arc::new(InMemoryProfileProvider::with_profiles(vec![
            Profile::new("a"),
            Profile::new("b"),
        ]));
        let service = service_with(provider);
        let matches = service
            .find_matches(&"a".into(), Scene::StudyRoom, 1)
            .await
            .unwrap();
        let id = matches[0].match_id;

        let err = service.accept_match(&id, &"c".into()).await.unwrap_err();
        assert!(err.is_validation());

        let accepted = service.accept_match(&id, &"b".into()).await.unwrap();
        assert_eq!(accepted.status, MatchStatus::Accepted);

        let rejected = service.reject_match(&id, &"a".into()).await.unwrap();
        assert_eq!(rejected.status, MatchStatus::Rejected);

        let err = service
            .reject_match(&MatchId::new(), &"a".into())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_match_weights_validates_sum() {
        let service = service_with(Arc::new(InMemoryProfileProvider::new()));

        let err = service
            .update_match_weights(Scene::StudyRoom, MatchWeights::new(0.5, 0.5, 0.5, 0.0))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let weights = MatchWeights::new(0.4, 0.3, 0.2, 0.1);
        service
            .update_match_weights(Scene::StudyRoom, weights)
            .await
            .unwrap();
        let config = service.get_scene_config(Scene::StudyRoom).await.unwrap();
        assert_eq!(config.match_weights, weights);
        assert_eq!(service.list_scenes().await.unwrap().len(), 4);
    }
}
