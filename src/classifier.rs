// 该文件是 Hairscope （发镜） 项目的一部分。
// src/classifier.rs - 脱发分期分类
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

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::ScalpFrame,
  input::ImageBuffer,
  model::{Model, Probabilities, StageLabels, SubjectCategory, UnknownCategory},
};

/// 识别为非头皮照片时给出的提示
pub const NON_SCALP_REASON: &str = "Invalid image! Please upload a scalp image.";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("{0}")]
  InvalidCategory(#[from] UnknownCategory),
  #[error("Error loading image {source_ref}: {error}")]
  ImageLoadError {
    source_ref: String,
    error: image::ImageError,
  },
  #[error("Prediction failed: {0}")]
  InferenceError(BoxError),
}

/// 两个类别的分期模型，启动时加载一次，之后只读共享
pub struct StageModels<M> {
  male: M,
  female: M,
}

impl<M> StageModels<M> {
  pub fn new(male: M, female: M) -> Self {
    Self { male, female }
  }

  pub fn get(&self, category: SubjectCategory) -> &M {
    match category {
      SubjectCategory::Male => &self.male,
      SubjectCategory::Female => &self.female,
    }
  }
}

/// 分类结论：有效分期，或者被判定为非头皮照片
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StageAssessment {
  Valid {
    label: &'static str,
    index: usize,
    confidence: f32,
  },
  Rejected {
    label: &'static str,
    reason: &'static str,
    confidence: f32,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
  pub image: String,
  pub category: SubjectCategory,
  pub assessment: StageAssessment,
}

impl ClassificationResult {
  pub fn is_valid(&self) -> bool {
    matches!(self.assessment, StageAssessment::Valid { .. })
  }

  pub fn stage_label(&self) -> &'static str {
    match self.assessment {
      StageAssessment::Valid { label, .. } | StageAssessment::Rejected { label, .. } => label,
    }
  }

  pub fn confidence(&self) -> f32 {
    match self.assessment {
      StageAssessment::Valid { confidence, .. } | StageAssessment::Rejected { confidence, .. } => {
        confidence
      }
    }
  }

  pub fn rejection_reason(&self) -> Option<&'static str> {
    match self.assessment {
      StageAssessment::Rejected { reason, .. } => Some(reason),
      StageAssessment::Valid { .. } => None,
    }
  }
}

pub struct StageClassifier<M> {
  models: Arc<StageModels<M>>,
}

impl<M> Clone for StageClassifier<M> {
  fn clone(&self) -> Self {
    Self {
      models: Arc::clone(&self.models),
    }
  }
}

impl<M, E> StageClassifier<M>
where
  M: Model<Input = ScalpFrame, Output = Probabilities, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  pub fn new(models: Arc<StageModels<M>>) -> Self {
    Self { models }
  }

  /// 类别以文本给出时先校验，非法类别不会触发推理
  pub fn classify_as(
    &self,
    image: &ImageBuffer,
    category: &str,
  ) -> Result<ClassificationResult, ClassifyError> {
    let category = category.parse::<SubjectCategory>().map_err(|e| {
      error!("Invalid gender: {}", category);
      ClassifyError::from(e)
    })?;
    self.classify(image, category)
  }

  pub fn classify(
    &self,
    image: &ImageBuffer,
    category: SubjectCategory,
  ) -> Result<ClassificationResult, ClassifyError> {
    let labels = StageLabels::for_category(category);

    let rgb = image.decode_rgb().map_err(|error| {
      error!("图像解码失败 {}: {}", image.source(), error);
      ClassifyError::ImageLoadError {
        source_ref: image.source().to_string(),
        error,
      }
    })?;
    let frame = ScalpFrame::from(&rgb);
    debug!("图像预处理完成: {}", image.source());

    let probabilities = self
      .models
      .get(category)
      .infer(&frame)
      .map_err(|e| {
        error!("推理失败: {}", e);
        ClassifyError::InferenceError(Box::new(e))
      })?;

    if probabilities.as_slice().len() != labels.len() {
      return Err(ClassifyError::InferenceError(
        format!(
          "模型输出 {} 个类别, {} 标签表有 {} 个",
          probabilities.as_slice().len(),
          category,
          labels.len()
        )
        .into(),
      ));
    }

    let (index, confidence) = probabilities
      .argmax()
      .ok_or_else(|| ClassifyError::InferenceError("模型输出包含非有限值".into()))?;
    let label = labels
      .get(index)
      .ok_or_else(|| ClassifyError::InferenceError(format!("类别下标越界: {index}").into()))?;
    info!("Prediction: {}, Confidence: {}", label, confidence);

    let assessment = if index == StageLabels::SENTINEL_INDEX {
      warn!("Detected non-scalp image. Marking as invalid.");
      StageAssessment::Rejected {
        label: labels.sentinel(),
        reason: NON_SCALP_REASON,
        confidence,
      }
    } else {
      StageAssessment::Valid {
        label,
        index,
        confidence,
      }
    };

    Ok(ClassificationResult {
      image: image.source().to_string(),
      category,
      assessment,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Debug, Error)]
  #[error("out of memory")]
  struct Oom;

  struct FixedModel {
    output: Result<Vec<f32>, ()>,
    calls: AtomicUsize,
  }

  impl FixedModel {
    fn new(output: Vec<f32>) -> Self {
      Self {
        output: Ok(output),
        calls: AtomicUsize::new(0),
      }
    }

    fn failing() -> Self {
      Self {
        output: Err(()),
        calls: AtomicUsize::new(0),
      }
    }
  }

  impl Model for FixedModel {
    type Input = ScalpFrame;
    type Output = Probabilities;
    type Error = Oom;

    fn infer(&self, _input: &ScalpFrame) -> Result<Probabilities, Oom> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.output.clone().map(Probabilities::from).map_err(|_| Oom)
    }
  }

  fn png() -> ImageBuffer {
    let image = image::RgbImage::from_pixel(32, 32, image::Rgb([120, 90, 80]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    ImageBuffer::new("scalp.png", bytes.into_inner())
  }

  fn classifier(male: FixedModel, female: FixedModel) -> StageClassifier<FixedModel> {
    StageClassifier::new(Arc::new(StageModels::new(male, female)))
  }

  #[test]
  fn valid_stage() {
    let c = classifier(
      FixedModel::new(vec![0.05, 0.05, 0.1, 0.6, 0.1, 0.05, 0.05]),
      FixedModel::new(vec![0.0; 6]),
    );
    let result = c.classify(&png(), SubjectCategory::Male).unwrap();
    assert!(result.is_valid());
    assert_eq!(result.stage_label(), "Stage 3");
    assert_eq!(result.confidence(), 0.6);
    assert_eq!(result.image, "scalp.png");
    assert_eq!(result.rejection_reason(), None);
  }

  #[test]
  fn sentinel_is_soft_rejection() {
    for category in [SubjectCategory::Male, SubjectCategory::Female] {
      let c = classifier(
        FixedModel::new(vec![0.7, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05]),
        FixedModel::new(vec![0.9, 0.02, 0.02, 0.02, 0.02, 0.02]),
      );
      let result = c.classify(&png(), category).unwrap();
      assert!(!result.is_valid());
      assert_eq!(result.stage_label(), "non-scalp");
      assert_eq!(result.rejection_reason(), Some(NON_SCALP_REASON));
      assert_eq!(result.category, category);
    }
  }

  #[test]
  fn invalid_category_skips_inference() {
    let c = classifier(FixedModel::new(vec![1.0; 7]), FixedModel::new(vec![1.0; 6]));
    let err = c.classify_as(&png(), "child").unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidCategory(_)));
    assert_eq!(c.models.male.calls.load(Ordering::SeqCst), 0);
    assert_eq!(c.models.female.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn category_text_selects_model() {
    let c = classifier(
      FixedModel::new(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
      FixedModel::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
    );
    let result = c.classify_as(&png(), "Female").unwrap();
    assert_eq!(result.stage_label(), "Stage 5");
    assert_eq!(c.models.male.calls.load(Ordering::SeqCst), 0);
    assert_eq!(c.models.female.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn undecodable_image() {
    let c = classifier(FixedModel::new(vec![1.0; 7]), FixedModel::new(vec![1.0; 6]));
    let err = c
      .classify(&ImageBuffer::new("junk", b"garbage".to_vec()), SubjectCategory::Male)
      .unwrap_err();
    assert!(matches!(err, ClassifyError::ImageLoadError { .. }));
    assert_eq!(c.models.male.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn model_failure_is_inference_error() {
    let c = classifier(FixedModel::failing(), FixedModel::new(vec![1.0; 6]));
    let err = c.classify(&png(), SubjectCategory::Male).unwrap_err();
    assert!(matches!(err, ClassifyError::InferenceError(_)));
  }

  #[test]
  fn output_length_must_match_labels() {
    // 女性标签表只有 6 项
    let c = classifier(FixedModel::new(vec![1.0; 7]), FixedModel::new(vec![0.5; 7]));
    let err = c.classify(&png(), SubjectCategory::Female).unwrap_err();
    assert!(matches!(err, ClassifyError::InferenceError(_)));
  }

  #[test]
  fn shared_across_threads() {
    let c = classifier(
      FixedModel::new(vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]),
      FixedModel::new(vec![0.0; 6]),
    );
    let image = png();
    std::thread::scope(|s| {
      for _ in 0..4 {
        let c = c.clone();
        let image = image.clone();
        s.spawn(move || {
          let result = c.classify(&image, SubjectCategory::Male).unwrap();
          assert_eq!(result.stage_label(), "Stage 2");
        });
      }
    });
    assert_eq!(c.models.male.calls.load(Ordering::SeqCst), 4);
  }
}
