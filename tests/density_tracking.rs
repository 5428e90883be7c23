// 该文件是 Hairscope （发镜） 项目的一部分。
// tests/density_tracking.rs - 密度追踪集成测试
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

use std::io::Cursor;

use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use proptest::prelude::*;

use hairscope::{DensityMetric, DensityTracker, ImageBuffer, TrackError, TrendStatus};

/// 10x10 的照片，前 `dark` 个像素是“头发”
fn scalp_photo(name: &str, dark: u32, format: ImageFormat) -> ImageBuffer {
  sized_scalp_photo(name, 10, dark, format)
}

fn sized_scalp_photo(name: &str, side: u32, dark: u32, format: ImageFormat) -> ImageBuffer {
  let image = RgbImage::from_fn(side, side, |x, y| {
    if y * side + x < dark {
      Rgb([20, 15, 10])
    } else {
      Rgb([220, 180, 160])
    }
  });
  let mut bytes = Cursor::new(Vec::new());
  image.write_to(&mut bytes, format).unwrap();
  ImageBuffer::new(name, bytes.into_inner())
}

fn week(n: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap() + Duration::weeks(n)
}

#[test]
fn four_weeks_in_order() {
  let images = vec![
    scalp_photo("w1.png", 10, ImageFormat::Png),
    scalp_photo("w2.png", 12, ImageFormat::Png),
    scalp_photo("w3.png", 9, ImageFormat::Png),
    scalp_photo("w4.png", 20, ImageFormat::Png),
  ];
  let result = DensityTracker::default()
    .track(&images, &[week(0), week(1), week(2), week(3)])
    .unwrap();

  let densities: Vec<f64> = result.samples.iter().map(|s| s.density_score).collect();
  assert_eq!(densities, vec![10.0, 12.0, 9.0, 20.0]);

  let changes: Vec<f64> = result.points.iter().map(|p| p.percentage_change).collect();
  assert_eq!(changes, vec![20.0, -10.0, 100.0]);
  let statuses: Vec<TrendStatus> = result.points.iter().map(|p| p.status).collect();
  assert_eq!(
    statuses,
    vec![TrendStatus::Improved, TrendStatus::Worsened, TrendStatus::Improved]
  );
  assert_eq!(result.overall_status, TrendStatus::Improved);
  assert_eq!(result.baseline().image_reference, "w1.png");
}

#[test]
fn raw_timestamps_are_parsed() {
  let images: Vec<ImageBuffer> = [40, 30, 35, 50]
    .iter()
    .map(|&d| scalp_photo("p.png", d, ImageFormat::Png))
    .collect();
  let result = DensityTracker::default()
    .track_raw(
      &images,
      &["2025-04-01T10:00:00", "2025-03-01", "2025-05-01T00:00:00Z", "2025-06-01 08:30:00"],
    )
    .unwrap();

  // 基线是三月那张（30%）
  assert_eq!(result.baseline().input_index, 1);
  let changes: Vec<f64> = result.points.iter().map(|p| p.percentage_change).collect();
  assert_eq!(changes, vec![33.3, 16.7, 66.7]);
}

#[test]
fn bad_timestamp_text() {
  let images: Vec<ImageBuffer> = (0..4)
    .map(|_| scalp_photo("p.png", 10, ImageFormat::Png))
    .collect();
  let err = DensityTracker::default()
    .track_raw(&images, &["2025-01-01", "yesterday", "2025-01-03", "2025-01-04"])
    .unwrap_err();
  assert!(matches!(err, TrackError::InvalidTimestamp { index: 1, .. }));
}

#[test]
fn one_broken_image_fails_the_batch() {
  let images = vec![
    scalp_photo("a.png", 10, ImageFormat::Png),
    scalp_photo("b.png", 12, ImageFormat::Png),
    ImageBuffer::new("c.jpg", b"\xFF\xD8 truncated".to_vec()),
    scalp_photo("d.png", 20, ImageFormat::Png),
  ];
  let err = DensityTracker::default()
    .track(&images, &[week(0), week(1), week(2), week(3)])
    .unwrap_err();
  match err {
    TrackError::ImageProcessingError { source_ref, .. } => assert_eq!(source_ref, "c.jpg"),
    other => panic!("unexpected error: {other:?}"),
  }
}

#[test]
fn count_mismatch_regardless_of_timestamps() {
  let tracker = DensityTracker::default();
  let three: Vec<ImageBuffer> = (0..3).map(|_| scalp_photo("p.png", 1, ImageFormat::Png)).collect();
  let five: Vec<ImageBuffer> = (0..5).map(|_| scalp_photo("p.png", 1, ImageFormat::Png)).collect();
  let four_ts = [week(0), week(1), week(2), week(3)];

  for images in [&three, &five] {
    assert!(matches!(
      tracker.track(images, &four_ts),
      Err(TrackError::InvalidInputCount { .. })
    ));
    assert!(matches!(
      tracker.track(images, &four_ts[..3]),
      Err(TrackError::InvalidInputCount { .. })
    ));
  }
}

#[test]
fn half_tenths_round_like_the_reports() {
  // 密度 100 / 94.75 / 95.25 / 95.0
  let images: Vec<ImageBuffer> = [400, 379, 381, 380]
    .iter()
    .map(|&d| sized_scalp_photo("p.png", 20, d, ImageFormat::Png))
    .collect();
  let result = DensityTracker::default()
    .track(&images, &[week(0), week(1), week(2), week(3)])
    .unwrap();

  let changes: Vec<f64> = result.points.iter().map(|p| p.percentage_change).collect();
  assert_eq!(changes, vec![-5.2, -4.8, -5.0]);
  let statuses: Vec<TrendStatus> = result.points.iter().map(|p| p.status).collect();
  assert_eq!(
    statuses,
    vec![TrendStatus::Worsened, TrendStatus::Stable, TrendStatus::Stable]
  );
  assert_eq!(result.mean_change, -5.0);
  assert_eq!(result.overall_status, TrendStatus::Stable);
}

#[test]
fn grayscale_and_alpha_inputs() {
  let metric = DensityMetric::default();

  let gray = GrayImage::from_fn(10, 10, |x, y| {
    if y * 10 + x < 30 {
      Luma([50])
    } else {
      Luma([51])
    }
  });
  let mut bytes = Cursor::new(Vec::new());
  gray.write_to(&mut bytes, ImageFormat::Png).unwrap();
  assert_eq!(metric.measure(&bytes.into_inner()).unwrap(), 30.0);

  // 透明度被丢弃，透明的深色像素仍算头发
  let rgba = RgbaImage::from_fn(10, 10, |x, y| {
    if y * 10 + x < 30 {
      Rgba([20, 15, 10, 0])
    } else {
      Rgba([220, 180, 160, 255])
    }
  });
  let mut bytes = Cursor::new(Vec::new());
  rgba.write_to(&mut bytes, ImageFormat::Png).unwrap();
  assert_eq!(metric.measure(&bytes.into_inner()).unwrap(), 30.0);
}

#[test]
fn decodes_lossless_formats_alike() {
  let metric = DensityMetric::default();
  let png = scalp_photo("p.png", 37, ImageFormat::Png);
  let bmp = scalp_photo("p.bmp", 37, ImageFormat::Bmp);
  assert_eq!(metric.measure(png.bytes()).unwrap(), 37.0);
  assert_eq!(metric.measure(bmp.bytes()).unwrap(), 37.0);
}

proptest! {
  #[test]
  fn order_does_not_matter(
    darks in prop::collection::vec(0u32..=100, 4),
    rotation in 0usize..4,
    swap in any::<bool>(),
  ) {
    let images: Vec<ImageBuffer> = darks
      .iter()
      .enumerate()
      .map(|(i, &d)| scalp_photo(&format!("w{i}.png"), d, ImageFormat::Png))
      .collect();
    let times: Vec<DateTime<Utc>> = (0..4).map(week).collect();
    let tracker = DensityTracker::default();
    let expected = tracker.track(&images, &times).unwrap();

    let mut order: Vec<usize> = (0..4).collect();
    order.rotate_left(rotation);
    if swap {
      order.swap(0, 3);
    }
    let shuffled_images: Vec<ImageBuffer> = order.iter().map(|&i| images[i].clone()).collect();
    let shuffled_times: Vec<DateTime<Utc>> = order.iter().map(|&i| times[i]).collect();
    let shuffled = tracker.track(&shuffled_images, &shuffled_times).unwrap();

    prop_assert_eq!(&shuffled.points, &expected.points);
    prop_assert_eq!(shuffled.overall_status, expected.overall_status);
    let refs: Vec<&str> = shuffled.samples.iter().map(|s| s.image_reference.as_str()).collect();
    let expected_refs: Vec<&str> = expected.samples.iter().map(|s| s.image_reference.as_str()).collect();
    prop_assert_eq!(refs, expected_refs);
  }

  #[test]
  fn metric_is_deterministic(pixels in prop::collection::vec(any::<u8>(), 3 * 16 * 16)) {
    let image = RgbImage::from_raw(16, 16, pixels).unwrap();
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    let bytes = bytes.into_inner();

    let metric = DensityMetric::default();
    let first = metric.measure(&bytes).unwrap();
    let second = metric.measure(&bytes).unwrap();
    prop_assert_eq!(first, second);
    prop_assert!((0.0..=100.0).contains(&first));
  }
}
