//! Human-readable explanation of why two users were matched

use crate::matching::scorer::{relevant_interests, shared_mbti_dimensions};
use crate::types::{Profile, Scene};

/// Used when no individual signal fires
pub const GENERIC_REASON: &str = "系统综合评估推荐";
/// Used when a profile cannot be loaded
pub const FALLBACK_REASON: &str = "系统推荐";

/// Emotional-stability gap below which users count as emotionally alike
const SIMILAR_EMOTION_GAP: f64 = 0.2;
/// Shared interests quoted in the reason
const MAX_QUOTED_INTERESTS: usize = 2;

/// Build the match reason from the signals that fire for this pair
pub fn match_reason(a: &Profile, b: &Profile, scene: Scene) -> String {
    let mut reasons = Vec::new();

    if let (Some(mbti_a), Some(mbti_b)) = (a.mbti_type.as_deref(), b.mbti_type.as_deref()) {
        match shared_mbti_dimensions(mbti_a, mbti_b) {
            Some(4) => reasons.push(format!("你们都是{}人格类型", mbti_a.trim().to_uppercase())),
            Some(n) if n >= 2 => reasons.push("你们的性格特质有很多相似之处".to_string()),
            _ => {}
        }
    }

    let interests_a = relevant_interests(a, scene);
    let interests_b = relevant_interests(b, scene);
    let mut common: Vec<&str> = interests_a.intersection(&interests_b).copied().collect();
    if !common.is_empty() {
        common.sort_unstable();
        let quoted = common
            .into_iter()
            .take(MAX_QUOTED_INTERESTS)
            .collect::<Vec<_>>()
            .join("、");
        reasons.push(match scene {
            Scene::StudyRoom => format!("你们都在准备{}", quoted),
            Scene::CareerConsulting => format!("你们都对{}感兴趣", quoted),
            Scene::TreeHole | Scene::InterestCommunity => format!("你们都喜欢{}", quoted),
        });
    }

    if a.tracks_scene(scene) && b.tracks_scene(scene) {
        reasons.push(format!("你们都关注{}场景", scene));
    }

    if (a.emotion_stability - b.emotion_stability).abs() < SIMILAR_EMOTION_GAP {
        reasons.push("你们的情绪特征相似".to_string());
    }

    if reasons.is_empty() {
        return GENERIC_REASON.to_string();
    }
    reasons.join("，")
}
