// 该文件是 Hairscope （发镜） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{RgbImage, imageops::FilterType};

/// 分期模型的输入边长
pub const STAGE_INPUT_SIZE: u32 = 224;

/// 分期模型使用的 224x224 RGB 帧
pub type ScalpFrame = RgbNhwcFrame<STAGE_INPUT_SIZE, STAGE_INPUT_SIZE>;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  /// 按 `value / 255` 归一化到 [0, 1]，保持 NHWC 排列
  pub fn to_unit_tensor(&self) -> Box<[f32]> {
    self.data.iter().map(|&v| f32::from(v) / 255.0).collect()
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNhwcFrame<W, H> {
  /// 双三次插值缩放到 W x H；`RgbImage` 的原始布局本身就是 NHWC
  fn from(image: &RgbImage) -> Self {
    let raw = if image.dimensions() == (W, H) {
      image.as_raw().clone()
    } else {
      image::imageops::resize(image, W, H, FilterType::CatmullRom).into_raw()
    };

    Self {
      data: raw.into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}
