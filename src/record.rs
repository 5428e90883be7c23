// 该文件是 Hairscope （发镜） 项目的一部分。
// src/record.rs - 分析记录
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
  classifier::ClassificationResult,
  model::SubjectCategory,
  tracker::{TrackingResult, TrendPoint, TrendStatus},
};

#[derive(Error, Debug)]
pub enum AnswersError {
  #[error("invalid questionnaire answers: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid questionnaire answers: expected a JSON object")]
  NotAnObject,
}

/// 问卷答案必须是 JSON 对象，缺省为空对象
pub fn parse_answers(raw: Option<&str>) -> Result<Map<String, Value>, AnswersError> {
  match raw {
    None => Ok(Map::new()),
    Some(text) => match serde_json::from_str::<Value>(text)? {
      Value::Object(map) => Ok(map),
      _ => Err(AnswersError::NotAnObject),
    },
  }
}

/// 用户标识用作目录名前，把 `[A-Za-z0-9_-]` 以外的字符换成 `_`
pub fn sanitize_user_id(user_id: &str) -> String {
  user_id
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
        c
      } else {
        '_'
      }
    })
    .collect()
}

/// 可落盘的分析记录
pub trait AnalysisRecord: Serialize {
  /// 记录所属的分类目录
  const KIND: &'static str;

  fn user_id(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
  pub user_id: String,
  pub image: String,
  pub category: SubjectCategory,
  pub stage: &'static str,
  pub confidence: f32,
  pub valid: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<&'static str>,
  pub questionnaire_answers: Map<String, Value>,
  pub recorded_at: DateTime<Utc>,
}

impl PredictionRecord {
  pub fn new(
    user_id: impl Into<String>,
    result: &ClassificationResult,
    questionnaire_answers: Map<String, Value>,
  ) -> Self {
    Self {
      user_id: user_id.into(),
      image: result.image.clone(),
      category: result.category,
      stage: result.stage_label(),
      confidence: result.confidence(),
      valid: result.is_valid(),
      reason: result.rejection_reason(),
      questionnaire_answers,
      recorded_at: Utc::now(),
    }
  }
}

impl AnalysisRecord for PredictionRecord {
  const KIND: &'static str = "predictions";

  fn user_id(&self) -> &str {
    &self.user_id
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingRecord {
  pub user_id: String,
  /// 按输入顺序
  pub images: Vec<String>,
  pub timestamps: Vec<DateTime<Utc>>,
  pub densities: Vec<f64>,
  pub results: Vec<TrendPoint>,
  pub status: TrendStatus,
  pub mean_change: f64,
  pub recorded_at: DateTime<Utc>,
}

impl TrackingRecord {
  pub fn new(user_id: impl Into<String>, result: &TrackingResult) -> Self {
    let mut samples = result.samples.clone();
    samples.sort_by_key(|s| s.input_index);

    Self {
      user_id: user_id.into(),
      images: samples.iter().map(|s| s.image_reference.clone()).collect(),
      timestamps: samples.iter().map(|s| s.timestamp).collect(),
      densities: samples.iter().map(|s| s.density_score).collect(),
      results: result.points.clone(),
      status: result.overall_status,
      mean_change: result.mean_change,
      recorded_at: Utc::now(),
    }
  }
}

impl AnalysisRecord for TrackingRecord {
  const KIND: &'static str = "tracking";

  fn user_id(&self) -> &str {
    &self.user_id
  }
}
