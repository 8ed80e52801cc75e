//! Per-scene optimization report

use crate::config::EngineConfig;
use crate::error::Result;
use crate::optimization::ab_testing::ABTestManager;
use crate::optimization::performance::{FeedbackAverages, PerformanceEvaluator};
use crate::optimization::tuner::WeightTuner;
use crate::types::{OptimizationReport, Scene};
use crate::utils::window_start;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

const LOW_SATISFACTION: f64 = 3.0;
const LOW_QUALITY: f64 = 5.0;
const LOW_ACCURACY: f64 = 3.0;
const MIN_FEEDBACKS: usize = 10;

/// Operator advice derived from the unrounded feedback means; never empty
pub fn recommendations(averages: &FeedbackAverages) -> Vec<String> {
    let mut advice = Vec::new();

    if averages.satisfaction < LOW_SATISFACTION {
        advice.push("用户满意度较低，建议检查匹配算法权重配置");
    }
    if averages.quality < LOW_QUALITY {
        advice.push("对话质量偏低，建议增加人格和兴趣匹配权重");
    }
    if averages.accuracy < LOW_ACCURACY {
        advice.push("匹配准确度不足，建议进行A/B测试优化权重");
    }
    if averages.feedbacks < MIN_FEEDBACKS {
        advice.push("反馈数据不足，建议增加用户反馈收集");
    }
    if advice.is_empty() {
        advice.push("当前性能良好，建议继续监控");
    }

    advice.into_iter().map(String::from).collect()
}

/// Collects metrics, recent adjustments and running tests for a scene
pub struct ReportGenerator {
    evaluator: Arc<PerformanceEvaluator>,
    tuner: Arc<WeightTuner>,
    ab_tests: Arc<ABTestManager>,
    window_days: i64,
    lookback_days: i64,
}

impl ReportGenerator {
    pub fn new(
        evaluator: Arc<PerformanceEvaluator>,
        tuner: Arc<WeightTuner>,
        ab_tests: Arc<ABTestManager>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            evaluator,
            tuner,
            ab_tests,
            window_days: config.performance.window_days,
            lookback_days: config.tuning.report_lookback_days,
        }
    }

    pub async fn generate_optimization_report(&self, scene: Scene) -> Result<OptimizationReport> {
        let (performance_metrics, averages) =
            self.evaluator.summarize(scene, self.window_days).await?;

        let since = window_start(Utc::now(), self.lookback_days)?;
        let recent_adjustments = self.tuner.list_adjustments(scene, Some(since)).await?;

        let active_ab_tests = self
            .ab_tests
            .list_ab_tests(Some(scene))
            .await?
            .into_iter()
            .filter(|test| test.is_active())
            .collect();

        let recommendations = recommendations(&averages);
        info!(
            "Generated optimization report for scene {} ({} recommendations)",
            scene,
            recommendations.len()
        );

        Ok(OptimizationReport {
            scene,
            generated_at: Utc::now(),
            performance_metrics,
            recent_adjustments,
            active_ab_tests,
            recommendations,
        })
    }
}
