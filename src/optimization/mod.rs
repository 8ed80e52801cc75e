//! Feedback-driven optimization of scene match weights
//!
//! - [`feedback`]: validated feedback collection
//! - [`performance`]: performance score and metrics per scene
//! - [`tuner`]: manual and automatic weight adjustments
//! - [`ab_testing`]: A/B tests over two weight configurations
//! - [`significance`]: significance tests used by A/B evaluation
//! - [`report`]: optimization report with recommendations

pub mod ab_testing;
pub mod feedback;
pub mod performance;
pub mod report;
pub mod significance;
pub mod tuner;

pub use ab_testing::{ABTestManager, TestCompletion};
pub use feedback::FeedbackCollector;
pub use performance::{FeedbackAverages, PerformanceEvaluator};
pub use report::{recommendations, ReportGenerator};
pub use significance::{
    GroupSample, HeuristicSignificance, SignificanceMethod, SignificanceTest, WelchSignificance,
};
pub use tuner::{IssueClassifier, IssueKind, KeywordIssueClassifier, WeightTuner};
