//! Core data types for the Affinity matching core
//!
//! This module defines the records shared by the scorer, the feedback
//! pipeline, the weight tuner and the A/B test manager: identifiers, scenes,
//! weight vectors, profiles, matches, feedback, adjustments and test results.

use crate::error::{AffinityError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Tolerance applied when checking that a weight vector sums to 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a scored match
    MatchId
);
uuid_id!(
    /// Unique identifier for a feedback record
    FeedbackId
);
uuid_id!(
    /// Unique identifier for a weight adjustment
    AdjustmentId
);
uuid_id!(
    /// Unique identifier for an A/B test
    TestId
);

/// Opaque user identifier issued by the profile provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Social context a match is computed for
///
/// The catalog is closed: scene names coming from the outside are parsed
/// with [`Scene::from_str`], which accepts either the canonical display name
/// or the snake_case identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    /// 考研自习室: study partners preparing for graduate entrance exams
    StudyRoom,
    /// 职业咨询室: career planning and job hunting
    CareerConsulting,
    /// 心理树洞: emotional support
    TreeHole,
    /// 兴趣社群: shared hobbies
    InterestCommunity,
}

impl Scene {
    pub const ALL: [Scene; 4] = [
        Scene::StudyRoom,
        Scene::CareerConsulting,
        Scene::TreeHole,
        Scene::InterestCommunity,
    ];

    /// Canonical display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Scene::StudyRoom => "考研自习室",
            Scene::CareerConsulting => "职业咨询室",
            Scene::TreeHole => "心理树洞",
            Scene::InterestCommunity => "兴趣社群",
        }
    }

    /// snake_case identifier, matches the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Scene::StudyRoom => "study_room",
            Scene::CareerConsulting => "career_consulting",
            Scene::TreeHole => "tree_hole",
            Scene::InterestCommunity => "interest_community",
        }
    }
}

impl std::fmt::Display for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Scene {
    type Err = AffinityError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Scene::ALL
            .into_iter()
            .find(|scene| scene.display_name() == trimmed || scene.as_str() == trimmed)
            .ok_or_else(|| AffinityError::validation(format!("Invalid scene: {}", s)))
    }
}

/// The four scoring dimensions a scene weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Personality,
    Interest,
    Scene,
    Emotion,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Personality,
        Dimension::Interest,
        Dimension::Scene,
        Dimension::Emotion,
    ];
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Personality => write!(f, "personality"),
            Dimension::Interest => write!(f, "interest"),
            Dimension::Scene => write!(f, "scene"),
            Dimension::Emotion => write!(f, "emotion"),
        }
    }
}

/// Per-dimension weights of a scene (sum to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub personality: f64,
    pub interest: f64,
    pub scene: f64,
    pub emotion: f64,
}

impl MatchWeights {
    pub fn new(personality: f64, interest: f64, scene: f64, emotion: f64) -> Self {
        Self {
            personality,
            interest,
            scene,
            emotion,
        }
    }

    /// Equal weights across all four dimensions
    pub fn uniform() -> Self {
        Self::new(0.25, 0.25, 0.25, 0.25)
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Personality => self.personality,
            Dimension::Interest => self.interest,
            Dimension::Scene => self.scene,
            Dimension::Emotion => self.emotion,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::Personality => self.personality = value,
            Dimension::Interest => self.interest = value,
            Dimension::Scene => self.scene = value,
            Dimension::Emotion => self.emotion = value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.personality + self.interest + self.scene + self.emotion
    }

    /// Check every weight is in [0, 1] and the total is 1.0 within tolerance
    ///
    /// `label` names the weight set in the error message ("Control weights").
    pub fn validate(&self, label: &str) -> Result<()> {
        for dimension in Dimension::ALL {
            let value = self.get(dimension);
            if !(0.0..=1.0).contains(&value) {
                return Err(AffinityError::validation(format!(
                    "{} weight for {} must be between 0 and 1, got {}",
                    label, dimension, value
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AffinityError::validation(format!(
                "{} must sum to 1.0, got {:.4}",
                label, sum
            )));
        }

        Ok(())
    }

    /// Rescale so the weights sum to 1.0; all-zero weights are returned as-is
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum <= 0.0 {
            return *self;
        }
        Self::new(
            self.personality / sum,
            self.interest / sum,
            self.scene / sum,
            self.emotion / sum,
        )
    }

    pub fn to_map(&self) -> HashMap<Dimension, f64> {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d))).collect()
    }
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Big-Five trait vector, each trait in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BigFive {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

/// User profile as supplied by the profile provider (read-only here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    #[serde(default)]
    pub mbti_type: Option<String>,
    #[serde(default)]
    pub big_five: Option<BigFive>,
    #[serde(default)]
    pub academic_interests: Vec<String>,
    #[serde(default)]
    pub career_interests: Vec<String>,
    #[serde(default)]
    pub hobby_interests: Vec<String>,
    #[serde(default)]
    pub current_scenes: Vec<Scene>,
    #[serde(default)]
    pub scene_priorities: HashMap<Scene, f64>,
    #[serde(default = "default_trait_level")]
    pub emotion_stability: f64,
    #[serde(default = "default_trait_level")]
    pub social_energy: f64,
}

fn default_trait_level() -> f64 {
    0.5
}

impl Profile {
    /// Empty profile with neutral emotional traits
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            mbti_type: None,
            big_five: None,
            academic_interests: Vec::new(),
            career_interests: Vec::new(),
            hobby_interests: Vec::new(),
            current_scenes: Vec::new(),
            scene_priorities: HashMap::new(),
            emotion_stability: default_trait_level(),
            social_energy: default_trait_level(),
        }
    }

    pub fn tracks_scene(&self, scene: Scene) -> bool {
        self.current_scenes.contains(&scene)
    }

    pub fn scene_priority(&self, scene: Scene) -> f64 {
        self.scene_priorities.get(&scene).copied().unwrap_or(0.0)
    }
}

/// Scene catalog entry
///
/// `topic_templates` and the intervention settings belong to the dialogue
/// assistant; they are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub scene: Scene,
    pub display_name: String,
    pub description: String,
    pub match_weights: MatchWeights,
    #[serde(default)]
    pub topic_templates: Vec<String>,
    #[serde(default)]
    pub intervention_threshold: u32,
    #[serde(default)]
    pub max_interventions_per_hour: u32,
}

impl SceneConfig {
    /// Built-in configuration for a scene
    pub fn default_for(scene: Scene) -> Self {
        let (description, weights, topics, threshold, per_hour) = match scene {
            Scene::StudyRoom => (
                "为准备考研的同学提供学习伙伴匹配，优先匹配相同目标院校和专业的用户",
                MatchWeights::new(0.25, 0.35, 0.30, 0.10),
                vec![
                    "你的目标院校是哪里？",
                    "你每天的学习时间安排是怎样的？",
                    "有什么好的学习方法可以分享吗？",
                    "你觉得考研最大的挑战是什么？",
                    "你是如何保持学习动力的？",
                ],
                15,
                3,
            ),
            Scene::CareerConsulting => (
                "为职业规划和求职提供交流平台，优先匹配相同职业兴趣或有相关经验的用户",
                MatchWeights::new(0.20, 0.40, 0.30, 0.10),
                vec![
                    "你对哪个行业感兴趣？",
                    "你有什么职业规划？",
                    "你参加过哪些实习或项目？",
                    "你理想的工作是什么样的？",
                    "你在求职过程中遇到了什么困难？",
                ],
                15,
                3,
            ),
            Scene::TreeHole => (
                "提供情感支持和心理倾诉空间，优先匹配有相似经历或情绪状态的用户",
                MatchWeights::new(0.30, 0.10, 0.20, 0.40),
                vec![
                    "最近有什么让你感到困扰的事情吗？",
                    "你通常如何缓解压力？",
                    "有什么让你感到开心的事情吗？",
                    "你觉得什么样的支持对你最有帮助？",
                    "你想聊聊你的感受吗？",
                ],
                20,
                2,
            ),
            Scene::InterestCommunity => (
                "基于共同兴趣爱好的社交匹配，优先匹配相同兴趣爱好的用户",
                MatchWeights::new(0.20, 0.50, 0.20, 0.10),
                vec![
                    "你最喜欢的兴趣爱好是什么？",
                    "你平时喜欢做什么？",
                    "有什么想一起做的活动吗？",
                    "你是怎么开始这个爱好的？",
                    "你有什么推荐的资源或经验吗？",
                ],
                15,
                3,
            ),
        };

        Self {
            scene,
            display_name: scene.display_name().to_string(),
            description: description.to_string(),
            match_weights: weights,
            topic_templates: topics.into_iter().map(String::from).collect(),
            intervention_threshold: threshold,
            max_interventions_per_hour: per_hour,
        }
    }
}

/// Composite score plus the four sub-scores, all in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub composite: f64,
    pub personality: f64,
    pub interest: f64,
    pub scene: f64,
    pub emotion: f64,
}

/// Lifecycle of a proposed match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Pending => write!(f, "pending"),
            MatchStatus::Accepted => write!(f, "accepted"),
            MatchStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A scored pair of users in a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: MatchId,
    pub user_a_id: UserId,
    pub user_b_id: UserId,
    pub scene: Scene,
    pub match_score: f64,
    pub personality_score: f64,
    pub interest_score: f64,
    pub scene_score: f64,
    pub emotion_sync_score: f64,
    pub match_reason: String,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.user_a_id == user_id || &self.user_b_id == user_id
    }
}

/// Feedback submitted after a matched conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback_id: FeedbackId,
    pub user_id: UserId,
    pub match_id: MatchId,
    pub scene: Scene,
    /// 0-5
    pub satisfaction_score: f64,
    /// 0-10
    pub conversation_quality: f64,
    /// 0-5
    pub match_accuracy: f64,
    #[serde(default)]
    pub positive_aspects: Vec<String>,
    #[serde(default)]
    pub negative_aspects: Vec<String>,
    #[serde(default)]
    pub suggestions: String,
    pub created_at: DateTime<Utc>,
}

/// Feedback as submitted, before an id and timestamp are assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub user_id: UserId,
    pub match_id: MatchId,
    pub scene: Scene,
    pub satisfaction_score: f64,
    pub conversation_quality: f64,
    pub match_accuracy: f64,
    #[serde(default)]
    pub positive_aspects: Vec<String>,
    #[serde(default)]
    pub negative_aspects: Vec<String>,
    #[serde(default)]
    pub suggestions: String,
}

/// Record of a weight change applied to a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAdjustment {
    pub adjustment_id: AdjustmentId,
    pub scene: Scene,
    pub old_weights: MatchWeights,
    pub new_weights: MatchWeights,
    pub reason: String,
    pub performance_before: f64,
    pub performance_after: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// A/B test arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestGroup {
    Control,
    Treatment,
}

impl std::fmt::Display for TestGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestGroup::Control => write!(f, "control"),
            TestGroup::Treatment => write!(f, "treatment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Control,
    Treatment,
    Tie,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::Control => write!(f, "control"),
            Winner::Treatment => write!(f, "treatment"),
            Winner::Tie => write!(f, "tie"),
        }
    }
}

/// A/B test over two weight configurations of one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTestConfig {
    pub test_id: TestId,
    pub test_name: String,
    pub scene: Scene,
    pub control_weights: MatchWeights,
    pub treatment_weights: MatchWeights,
    /// Fraction of users assigned to treatment, in (0, 1)
    pub traffic_split: f64,
    /// Minimum feedback count per group before evaluation
    pub min_sample_size: usize,
    pub status: TestStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ABTestConfig {
    pub fn weights_for(&self, group: TestGroup) -> MatchWeights {
        match group {
            TestGroup::Control => self.control_weights,
            TestGroup::Treatment => self.treatment_weights,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TestStatus::Active
    }
}

/// Request to create an A/B test; unset fields fall back to configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewABTest {
    pub test_name: String,
    pub scene: Scene,
    pub control_weights: MatchWeights,
    pub treatment_weights: MatchWeights,
    #[serde(default)]
    pub traffic_split: Option<f64>,
    #[serde(default)]
    pub min_sample_size: Option<usize>,
}

/// Outcome of evaluating an A/B test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTestResult {
    pub test_id: TestId,
    pub control_sample_size: usize,
    pub control_avg_satisfaction: f64,
    pub control_avg_quality: f64,
    pub treatment_sample_size: usize,
    pub treatment_avg_satisfaction: f64,
    pub treatment_avg_quality: f64,
    pub is_significant: bool,
    pub p_value: f64,
    pub winner: Winner,
    pub recommendation: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Aggregated feedback statistics for a scene over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub scene: Scene,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Distinct matches referenced by feedback in the period
    pub total_matches: usize,
    pub avg_match_score: f64,
    pub total_feedbacks: usize,
    pub avg_satisfaction: f64,
    pub avg_conversation_quality: f64,
    pub avg_match_accuracy: f64,
    pub performance_score: f64,
}

/// Per-scene optimization report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub scene: Scene,
    pub generated_at: DateTime<Utc>,
    pub performance_metrics: PerformanceMetrics,
    pub recent_adjustments: Vec<WeightAdjustment>,
    pub active_ab_tests: Vec<ABTestConfig>,
    pub recommendations: Vec<String>,
}
