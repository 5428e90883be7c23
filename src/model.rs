// 该文件是 Hairscope （发镜） 项目的一部分。
// src/model.rs - 模型
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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FromUrl, frame::ScalpFrame};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 受检对象类别，每个类别有独立的分期模型和标签表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectCategory {
  Male,
  Female,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid gender selection '{0}'. Choose 'male' or 'female'.")]
pub struct UnknownCategory(pub String);

impl FromStr for SubjectCategory {
  type Err = UnknownCategory;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "male" => Ok(SubjectCategory::Male),
      "female" => Ok(SubjectCategory::Female),
      _ => Err(UnknownCategory(s.to_string())),
    }
  }
}

impl fmt::Display for SubjectCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SubjectCategory::Male => f.write_str("male"),
      SubjectCategory::Female => f.write_str("female"),
    }
  }
}

const MALE_STAGE_LABELS: [&str; 7] = [
  "non-scalp",
  "Stage 1",
  "Stage 2",
  "Stage 3",
  "Stage 4",
  "Stage 5",
  "Stage 6",
];

const FEMALE_STAGE_LABELS: [&str; 6] = [
  "non-scalp",
  "Stage 1",
  "Stage 2",
  "Stage 3",
  "Stage 4",
  "Stage 5",
];

/// 按严重程度排序的分期标签，下标 0 固定为“非头皮”哨兵
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLabels {
  labels: &'static [&'static str],
}

impl StageLabels {
  pub const SENTINEL_INDEX: usize = 0;

  pub fn for_category(category: SubjectCategory) -> Self {
    let labels: &'static [&'static str] = match category {
      SubjectCategory::Male => &MALE_STAGE_LABELS,
      SubjectCategory::Female => &FEMALE_STAGE_LABELS,
    };
    Self { labels }
  }

  // 标签表至少含哨兵，不会为空
  #[allow(clippy::len_without_is_empty)]
  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn get(&self, index: usize) -> Option<&'static str> {
    self.labels.get(index).copied()
  }

  pub fn sentinel(&self) -> &'static str {
    self.labels[Self::SENTINEL_INDEX]
  }
}

/// 模型输出的类别概率分布
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities(Box<[f32]>);

impl Probabilities {
  pub fn as_slice(&self) -> &[f32] {
    &self.0
  }

  /// 最大概率的下标和值；并列时取第一个，空或含 NaN 时返回 None
  pub fn argmax(&self) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in self.0.iter().enumerate() {
      if !p.is_finite() {
        return None;
      }
      match best {
        Some((_, q)) if q >= p => {}
        _ => best = Some((index, p)),
      }
    }
    best
  }

  /// 把原始 logits 转成概率
  pub fn softmax(logits: &[f32]) -> Self {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    Self(exps.into_iter().map(|e| e / sum).collect())
  }
}

impl From<Vec<f32>> for Probabilities {
  fn from(values: Vec<f32>) -> Self {
    Self(values.into_boxed_slice())
  }
}

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnStageModel, RknnStageModelBuilder, RknnStageModelError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_rknn")]
  #[error("RKNN 模型错误: {0}")]
  RknnStageModelError(#[from] RknnStageModelError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的分期模型后端
pub enum ModelWrapper {
  #[cfg(feature = "model_rknn")]
  Rknn(RknnStageModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_rknn")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == RknnStageModelBuilder::SCHEME {
        let model = RknnStageModelBuilder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Rknn(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Input = ScalpFrame;
  type Output = Probabilities;
  type Error = ModelError;

  #[allow(unused_variables)]
  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match *self {
      #[cfg(feature = "model_rknn")]
      ModelWrapper::Rknn(ref model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
