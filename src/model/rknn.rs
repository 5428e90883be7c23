// 该文件是 Hairscope （发镜） 项目的一部分。
// src/model/rknn.rs - RKNN 分期模型
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

use std::sync::Mutex;

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, ScalpFrame},
  model::{Model, Probabilities},
  url_file_path,
};

const STAGE_MODEL_NUM_INPUTS: u32 = 1;
const STAGE_MODEL_NUM_OUTPUTS: u32 = 1;

/// 单输入单输出的分类模型
///
/// 模型转换时需要把 `/255` 归一化写进 RKNN 配置（mean 0, std 255），
/// 推理时直接喂 UInt8 NHWC 数据。
pub struct RknnStageModel {
  // NPU 上下文在 set_input/run 之间有状态，并发调用需要排队
  context: Mutex<Context>,
  softmax: bool,
}

#[derive(Error, Debug)]
pub enum RknnStageModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理上下文不可用")]
  ContextPoisoned,
}

impl RknnStageModelError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnStageModelError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnStageModelBuilder {
  model_path: String,
  softmax: bool,
}

impl FromUrlWithScheme for RknnStageModelBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnStageModelBuilder {
  type Error = RknnStageModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnStageModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let softmax = url.query_pairs().any(|(k, v)| k == "softmax" && v != "false");

    Ok(RknnStageModelBuilder {
      model_path: url_file_path(url),
      softmax,
    })
  }
}

impl RknnStageModelBuilder {
  pub fn build(self) -> Result<RknnStageModel, RknnStageModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, InitFlags::default())?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnStageModelError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnStageModelError::invalid("无法获取输出数量", e))?;

    if num_inputs != STAGE_MODEL_NUM_INPUTS || num_outputs != STAGE_MODEL_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        STAGE_MODEL_NUM_INPUTS, STAGE_MODEL_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnStageModelError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成: {}", self.model_path);
    Ok(RknnStageModel {
      context: Mutex::new(context),
      softmax: self.softmax,
    })
  }
}

impl Model for RknnStageModel {
  type Input = ScalpFrame;
  type Output = Probabilities;
  type Error = RknnStageModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let context = self
      .context
      .lock()
      .map_err(|_| RknnStageModelError::ContextPoisoned)?;

    debug!("设置模型输入");
    context.set_input(
      0,
      input.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    context.run()?;

    let output = context.get_outputs()?;
    let scores = output.get_f32(0)?.to_vec();
    debug!("模型输出: {:?}", scores);

    Ok(if self.softmax {
      Probabilities::softmax(&scores)
    } else {
      Probabilities::from(scores)
    })
  }
}
