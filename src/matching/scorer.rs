//! Compatibility scoring between two profiles in a scene.
//!
//! Four sub-scores, each in [0, 100], combined by the scene's weights:
//!
//! - **Personality**: 40 points from MBTI agreement, 60 from Big-Five similarity
//! - **Interest**: Jaccard similarity of the scene-relevant interest sets
//! - **Scene**: both users tracking the scene, scaled by their priorities
//! - **Emotion**: closeness of emotional stability and social energy
//!
//! Everything here is pure; loading profiles and weights is the caller's job.

use crate::types::{BigFive, MatchWeights, Profile, Scene, SceneConfig, ScoreBreakdown};
use crate::utils::round2;
use std::collections::HashSet;

/// Points the MBTI half contributes at full compatibility
const MBTI_POINTS: f64 = 40.0;
/// Points the Big-Five half contributes at full similarity
const BIG_FIVE_POINTS: f64 = 60.0;

/// Interest score when either side has nothing to compare
pub const NEUTRAL_INTEREST_SCORE: f64 = 50.0;
/// Scene score when either side does not track the scene
pub const UNTRACKED_SCENE_SCORE: f64 = 30.0;

/// Big-Five trait weights (sum to 1.0); agreeableness and extraversion
/// matter most for conversation partners
const NEUROTICISM_WEIGHT: f64 = 0.15;
const AGREEABLENESS_WEIGHT: f64 = 0.25;
const EXTRAVERSION_WEIGHT: f64 = 0.25;
const OPENNESS_WEIGHT: f64 = 0.15;
const CONSCIENTIOUSNESS_WEIGHT: f64 = 0.20;

/// Score a pair with the scene's configured weights
pub fn score(a: &Profile, b: &Profile, config: &SceneConfig) -> ScoreBreakdown {
    score_with_weights(a, b, config.scene, &config.match_weights)
}

/// Score a pair with explicit weights (A/B test arms use this)
pub fn score_with_weights(
    a: &Profile,
    b: &Profile,
    scene: Scene,
    weights: &MatchWeights,
) -> ScoreBreakdown {
    let personality = personality_score(a, b);
    let interest = interest_score(a, b, scene);
    let scene_score = scene_score(a, b, scene);
    let emotion = emotion_sync_score(a, b);

    let composite = personality * weights.personality
        + interest * weights.interest
        + scene_score * weights.scene
        + emotion * weights.emotion;

    ScoreBreakdown {
        composite: round2(composite).clamp(0.0, 100.0),
        personality,
        interest,
        scene: scene_score,
        emotion,
    }
}

/// MBTI half plus Big-Five half; a half is skipped when either side lacks it
pub fn personality_score(a: &Profile, b: &Profile) -> f64 {
    let mut score = 0.0;

    if let (Some(mbti_a), Some(mbti_b)) = (a.mbti_type.as_deref(), b.mbti_type.as_deref()) {
        score += mbti_compatibility(mbti_a, mbti_b) * MBTI_POINTS;
    }

    if let (Some(big_five_a), Some(big_five_b)) = (&a.big_five, &b.big_five) {
        score += big_five_compatibility(big_five_a, big_five_b) * BIG_FIVE_POINTS;
    }

    score.clamp(0.0, 100.0)
}

/// Number of the four MBTI letters two codes share, `None` for malformed codes
pub fn shared_mbti_dimensions(a: &str, b: &str) -> Option<usize> {
    let a: Vec<char> = a.trim().to_uppercase().chars().collect();
    let b: Vec<char> = b.trim().to_uppercase().chars().collect();
    if a.len() != 4 || b.len() != 4 {
        return None;
    }
    Some(a.iter().zip(&b).filter(|(x, y)| x == y).count())
}

/// MBTI compatibility in [0, 1]
///
/// Two or three shared letters score highest; identical types score a bit
/// lower since they lack complementarity. Malformed codes score 0.5.
pub fn mbti_compatibility(a: &str, b: &str) -> f64 {
    match shared_mbti_dimensions(a, b) {
        Some(2) | Some(3) => 0.9,
        Some(4) => 0.8,
        Some(1) => 0.6,
        Some(_) => 0.4,
        None => 0.5,
    }
}

/// Weighted per-trait similarity `1 - |a - b|`, in [0, 1]
pub fn big_five_compatibility(a: &BigFive, b: &BigFive) -> f64 {
    let similarity = |x: f64, y: f64| 1.0 - (x - y).abs();

    similarity(a.neuroticism, b.neuroticism) * NEUROTICISM_WEIGHT
        + similarity(a.agreeableness, b.agreeableness) * AGREEABLENESS_WEIGHT
        + similarity(a.extraversion, b.extraversion) * EXTRAVERSION_WEIGHT
        + similarity(a.openness, b.openness) * OPENNESS_WEIGHT
        + similarity(a.conscientiousness, b.conscientiousness) * CONSCIENTIOUSNESS_WEIGHT
}

/// Interest set that matters in a scene
pub fn relevant_interests(profile: &Profile, scene: Scene) -> HashSet<&str> {
    match scene {
        Scene::StudyRoom => profile.academic_interests.iter().map(String::as_str).collect(),
        Scene::CareerConsulting => profile.career_interests.iter().map(String::as_str).collect(),
        Scene::TreeHole | Scene::InterestCommunity => profile
            .academic_interests
            .iter()
            .chain(&profile.career_interests)
            .chain(&profile.hobby_interests)
            .map(String::as_str)
            .collect(),
    }
}

/// Jaccard similarity of the relevant interests, scaled to [0, 100]
pub fn interest_score(a: &Profile, b: &Profile, scene: Scene) -> f64 {
    let interests_a = relevant_interests(a, scene);
    let interests_b = relevant_interests(b, scene);

    if interests_a.is_empty() || interests_b.is_empty() {
        return NEUTRAL_INTEREST_SCORE;
    }

    let intersection = interests_a.intersection(&interests_b).count();
    let union = interests_a.union(&interests_b).count();

    round2(intersection as f64 / union as f64 * 100.0)
}

/// 30 unless both users track the scene, else 50 plus half the mean priority
pub fn scene_score(a: &Profile, b: &Profile, scene: Scene) -> f64 {
    if !a.tracks_scene(scene) || !b.tracks_scene(scene) {
        return UNTRACKED_SCENE_SCORE;
    }

    let avg_priority = (a.scene_priority(scene) + b.scene_priority(scene)) / 2.0;
    round2(50.0 + avg_priority.clamp(0.0, 1.0) * 50.0)
}

/// Closeness of emotional stability and social energy, in [0, 100]
pub fn emotion_sync_score(a: &Profile, b: &Profile) -> f64 {
    let stability_similarity = 1.0 - (a.emotion_stability - b.emotion_stability).abs();
    let energy_similarity = 1.0 - (a.social_energy - b.social_energy).abs();

    round2((stability_similarity * 0.5 + energy_similarity * 0.5) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big_five(value: f64) -> BigFive {
        BigFive {
            openness: value,
            conscientiousness: value,
            extraversion: value,
            agreeableness: value,
            neuroticism: value,
        }
    }

    fn profile(id: &str) -> Profile {
        Profile::new(id)
    }

    #[test]
    fn test_mbti_lookup_table() {
        assert_eq!(mbti_compatibility("INTJ", "INTJ"), 0.8);
        assert_eq!(mbti_compatibility("INTJ", "INTP"), 0.9);
        assert_eq!(mbti_compatibility("INTJ", "INFP"), 0.9);
        assert_eq!(mbti_compatibility("INTJ", "ESFJ"), 0.6);
        assert_eq!(mbti_compatibility("INTJ", "ESFP"), 0.4);
        assert_eq!(mbti_compatibility("intj", "INTJ"), 0.8);
        assert_eq!(mbti_compatibility("INT", "INTJ"), 0.5);
    }

    #[test]
    fn test_personality_halves() {
        let mut a = profile("a");
        let mut b = profile("b");
        assert_eq!(personality_score(&a, &b), 0.0);

        a.mbti_type = Some("ENFP".to_string());
        b.mbti_type = Some("ENFJ".to_string());
        assert!((personality_score(&a, &b) - 36.0).abs() < 1e-9);

        a.big_five = Some(big_five(0.7));
        b.big_five = Some(big_five(0.7));
        assert!((personality_score(&a, &b) - 96.0).abs() < 1e-9);

        b.mbti_type = None;
        assert!((personality_score(&a, &b) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_big_five_weighted_similarity() {
        let a = big_five(0.2);
        let mut b = big_five(0.2);
        assert!((big_five_compatibility(&a, &b) - 1.0).abs() < 1e-9);

        b.agreeableness = 1.0;
        // agreeableness differs by 0.8, weight 0.25
        assert!((big_five_compatibility(&a, &b) - (1.0 - 0.8 * 0.25)).abs() < 1e-9);
    }

    #[test]
    fn test_interest_score_uses_scene_specific_sets() {
        let mut a = profile("a");
        let mut b = profile("b");
        a.academic_interests = vec!["数学".into(), "英语".into()];
        b.academic_interests = vec!["数学".into(), "政治".into()];
        a.hobby_interests = vec!["篮球".into()];
        b.hobby_interests = vec!["篮球".into()];

        // {数学} / {数学, 英语, 政治}
        assert_eq!(interest_score(&a, &b, Scene::StudyRoom), 33.33);
        // {数学, 篮球} / {数学, 英语, 政治, 篮球}
        assert_eq!(interest_score(&a, &b, Scene::InterestCommunity), 50.0);
        // no career interests on either side
        assert_eq!(
            interest_score(&a, &b, Scene::CareerConsulting),
            NEUTRAL_INTEREST_SCORE
        );
    }

    #[test]
    fn test_interest_score_is_symmetric() {
        let mut a = profile("a");
        let mut b = profile("b");
        a.hobby_interests = vec!["摄影".into(), "旅行".into(), "电影".into()];
        b.hobby_interests = vec!["电影".into(), "音乐".into()];
        assert_eq!(
            interest_score(&a, &b, Scene::TreeHole),
            interest_score(&b, &a, Scene::TreeHole)
        );
    }

    #[test]
    fn test_scene_score() {
        let mut a = profile("a");
        let mut b = profile("b");
        assert_eq!(scene_score(&a, &b, Scene::StudyRoom), UNTRACKED_SCENE_SCORE);

        a.current_scenes = vec![Scene::StudyRoom];
        b.current_scenes = vec![Scene::StudyRoom];
        assert_eq!(scene_score(&a, &b, Scene::StudyRoom), 50.0);

        a.scene_priorities.insert(Scene::StudyRoom, 1.0);
        b.scene_priorities.insert(Scene::StudyRoom, 0.6);
        assert_eq!(scene_score(&a, &b, Scene::StudyRoom), 90.0);
    }

    #[test]
    fn test_emotion_sync_score() {
        let mut a = profile("a");
        let mut b = profile("b");
        assert_eq!(emotion_sync_score(&a, &b), 100.0);

        a.emotion_stability = 0.9;
        b.emotion_stability = 0.5;
        a.social_energy = 0.2;
        b.social_energy = 0.4;
        assert_eq!(emotion_sync_score(&a, &b), 70.0);
    }

    #[test]
    fn test_composite_uses_scene_weights() {
        let mut a = profile("a");
        let mut b = profile("b");
        a.mbti_type = Some("INTJ".into());
        b.mbti_type = Some("INTJ".into());

        let config = SceneConfig::default_for(Scene::TreeHole);
        let breakdown = score(&a, &b, &config);

        // personality 32, interest 50, scene 30, emotion 100
        let expected = 32.0 * 0.30 + 50.0 * 0.10 + 30.0 * 0.20 + 100.0 * 0.40;
        assert_eq!(breakdown.personality, 32.0);
        assert_eq!(breakdown.interest, 50.0);
        assert_eq!(breakdown.scene, 30.0);
        assert_eq!(breakdown.emotion, 100.0);
        assert!((breakdown.composite - round2(expected)).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_weights_override_scene_weights() {
        let a = profile("a");
        let b = profile("b");
        let only_emotion = MatchWeights::new(0.0, 0.0, 0.0, 1.0);

        let breakdown = score_with_weights(&a, &b, Scene::StudyRoom, &only_emotion);
        assert_eq!(breakdown.composite, 100.0);
    }
}
