// 该文件是 Hairscope （发镜） 项目的一部分。
// src/tracker.rs - 头发密度趋势追踪
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

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  density::{DensityError, DensityMetric},
  input::ImageBuffer,
};

/// 一次追踪固定比较四张照片
pub const TRACKING_SAMPLE_COUNT: usize = 4;

/// 变化率低于该值（不含）才算恶化
const WORSENED_BELOW: f64 = -5.0;

#[derive(Error, Debug)]
pub enum TrackError {
  #[error("Exactly 4 images and timestamps are required, got {images} images and {timestamps} timestamps")]
  InvalidInputCount { images: usize, timestamps: usize },
  #[error("Failed to process image {source_ref}: {error}")]
  ImageProcessingError {
    source_ref: String,
    error: DensityError,
  },
  #[error("Invalid timestamp #{index}: '{raw}'")]
  InvalidTimestamp { index: usize, raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendStatus {
  Improved,
  Worsened,
  Stable,
}

impl TrendStatus {
  /// 正变化即改善，低于 -5% 才算恶化，(-5, 0] 为稳定
  pub fn from_change(percentage_change: f64) -> Self {
    if percentage_change > 0.0 {
      TrendStatus::Improved
    } else if percentage_change < WORSENED_BELOW {
      TrendStatus::Worsened
    } else {
      TrendStatus::Stable
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DensitySample {
  pub image_reference: String,
  pub input_index: usize,
  pub timestamp: DateTime<Utc>,
  pub density_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
  pub period_index: usize,
  pub percentage_change: f64,
  pub status: TrendStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingResult {
  /// 按时间升序，第一个为基线
  pub samples: Vec<DensitySample>,
  pub points: Vec<TrendPoint>,
  pub mean_change: f64,
  pub overall_status: TrendStatus,
}

impl TrackingResult {
  pub fn baseline(&self) -> &DensitySample {
    &self.samples[0]
  }
}

/// 按浮点数的精确十进制值保留一位小数，恰好居中时取偶数
fn round_one_decimal(value: f64) -> f64 {
  format!("{value:.1}").parse().unwrap_or(value)
}

/// 相对基线的变化率（百分比，保留一位小数）；基线为 0 时记为 0
pub fn percentage_change(baseline: f64, current: f64) -> f64 {
  if baseline == 0.0 {
    0.0
  } else {
    round_one_decimal((current - baseline) / baseline * 100.0)
  }
}

/// 接受 RFC 3339、无时区的 ISO 8601（按 UTC）以及纯日期
pub fn parse_timestamp(index: usize, raw: &str) -> Result<DateTime<Utc>, TrackError> {
  let text = raw.trim();
  if let Ok(t) = DateTime::parse_from_rfc3339(text) {
    return Ok(t.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
    if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
      return Ok(t.and_utc());
    }
  }
  if let Some(t) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
  {
    return Ok(t.and_utc());
  }

  error!("无法解析时间戳 #{}: {}", index, raw);
  Err(TrackError::InvalidTimestamp {
    index,
    raw: raw.to_string(),
  })
}

/// 对已测得密度的样本做时间排序和趋势计算
pub fn analyze_trend(mut samples: Vec<DensitySample>) -> Result<TrackingResult, TrackError> {
  if samples.len() != TRACKING_SAMPLE_COUNT {
    return Err(TrackError::InvalidInputCount {
      images: samples.len(),
      timestamps: samples.len(),
    });
  }

  // 稳定排序，同一时刻保持输入顺序
  samples.sort_by_key(|s| s.timestamp);

  let baseline = samples[0].density_score;
  let points: Vec<TrendPoint> = samples
    .iter()
    .enumerate()
    .skip(1)
    .map(|(i, sample)| {
      let change = percentage_change(baseline, sample.density_score);
      TrendPoint {
        period_index: i + 1,
        percentage_change: change,
        status: TrendStatus::from_change(change),
      }
    })
    .collect();

  let mean_change = points.iter().map(|p| p.percentage_change).sum::<f64>() / points.len() as f64;
  let overall_status = TrendStatus::from_change(mean_change);
  info!(
    "趋势计算完成: 基线 {:.2}%, 平均变化 {:.2}%, 总体 {:?}",
    baseline, mean_change, overall_status
  );

  Ok(TrackingResult {
    samples,
    points,
    mean_change,
    overall_status,
  })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DensityTracker {
  metric: DensityMetric,
}

impl DensityTracker {
  pub fn new(metric: DensityMetric) -> Self {
    Self { metric }
  }

  /// 时间戳以文本给出时，先解析再测量
  pub fn track_raw<S: AsRef<str>>(
    &self,
    images: &[ImageBuffer],
    timestamps: &[S],
  ) -> Result<TrackingResult, TrackError> {
    check_counts(images.len(), timestamps.len())?;
    let parsed = timestamps
      .iter()
      .enumerate()
      .map(|(i, raw)| parse_timestamp(i, raw.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    self.track(images, &parsed)
  }

  pub fn track(
    &self,
    images: &[ImageBuffer],
    timestamps: &[DateTime<Utc>],
  ) -> Result<TrackingResult, TrackError> {
    check_counts(images.len(), timestamps.len())?;

    let densities = self.measure_all(images)?;
    let samples = images
      .iter()
      .zip(timestamps)
      .zip(densities)
      .enumerate()
      .map(|(input_index, ((image, &timestamp), density_score))| DensitySample {
        image_reference: image.source().to_string(),
        input_index,
        timestamp,
        density_score,
      })
      .collect();

    analyze_trend(samples)
  }

  /// 四张图并行测量；任意一张失败则整体失败，按输入顺序报告第一个错误
  fn measure_all(&self, images: &[ImageBuffer]) -> Result<Vec<f64>, TrackError> {
    let metric = self.metric;
    let results: Vec<Result<f64, TrackError>> = std::thread::scope(|s| {
      let handles: Vec<_> = images
        .iter()
        .map(|image| s.spawn(move || metric.measure(image.bytes())))
        .collect();

      handles
        .into_iter()
        .zip(images)
        .map(|(handle, image)| {
          let measured = match handle.join() {
            Ok(measured) => measured,
            Err(_) => Err(DensityError::WorkerPanicked),
          };
          measured
            .map(|density| {
              debug!("Density for {}: {:.2}%", image.source(), density);
              density
            })
            .map_err(|error| {
              error!("Error processing image {}: {}", image.source(), error);
              TrackError::ImageProcessingError {
                source_ref: image.source().to_string(),
                error,
              }
            })
        })
        .collect()
    });

    results.into_iter().collect()
  }
}

fn check_counts(images: usize, timestamps: usize) -> Result<(), TrackError> {
  if images != TRACKING_SAMPLE_COUNT || timestamps != TRACKING_SAMPLE_COUNT {
    error!("Exactly 4 images and timestamps are required");
    return Err(TrackError::InvalidInputCount { images, timestamps });
  }
  Ok(())
}
