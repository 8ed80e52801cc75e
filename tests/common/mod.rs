//! Common test utilities and helpers

#![allow(dead_code)]

use affinity_core::storage::InMemoryProfileProvider;
use affinity_core::types::{BigFive, NewFeedback};
use affinity_core::{AffinityEngine, EngineConfig, MatchWeights, Profile, Repositories, Scene};
use std::sync::Arc;

/// Engine over in-memory repositories with default configuration
pub fn create_test_engine(profiles: Vec<Profile>) -> AffinityEngine {
    create_test_engine_with_config(profiles, EngineConfig::default())
}

pub fn create_test_engine_with_config(
    profiles: Vec<Profile>,
    config: EngineConfig,
) -> AffinityEngine {
    let provider = Arc::new(InMemoryProfileProvider::with_profiles(profiles));
    AffinityEngine::new(Repositories::in_memory(provider), config)
}

pub fn big_five(value: f64) -> BigFive {
    BigFive {
        openness: value,
        conscientiousness: value,
        extraversion: value,
        agreeableness: value,
        neuroticism: value,
    }
}

/// Exam candidate tracking the study room with full priority
pub fn exam_candidate(id: &str, mbti: &str, subjects: &[&str]) -> Profile {
    let mut profile = Profile::new(id);
    profile.mbti_type = Some(mbti.to_string());
    profile.academic_interests = subjects.iter().map(|s| s.to_string()).collect();
    profile.current_scenes = vec![Scene::StudyRoom];
    profile.scene_priorities.insert(Scene::StudyRoom, 1.0);
    profile
}

/// Feedback submission with the given ratings and negative tags
pub fn feedback(
    user: &str,
    scene: Scene,
    satisfaction: f64,
    quality: f64,
    accuracy: f64,
    negative: &[&str],
) -> NewFeedback {
    NewFeedback {
        user_id: user.into(),
        match_id: affinity_core::types::MatchId::new(),
        scene,
        satisfaction_score: satisfaction,
        conversation_quality: quality,
        match_accuracy: accuracy,
        positive_aspects: vec![],
        negative_aspects: negative.iter().map(|s| s.to_string()).collect(),
        suggestions: String::new(),
    }
}

pub fn assert_sums_to_one(weights: &MatchWeights) {
    assert!(
        (weights.sum() - 1.0).abs() <= 0.01,
        "weights sum to {}: {:?}",
        weights.sum(),
        weights
    );
}
