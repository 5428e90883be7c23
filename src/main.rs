// 该文件是 Hairscope （发镜） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use hairscope::{
  DensityTracker, FromUrl, StageClassifier, StageModels, SubjectCategory,
  input::{ImageBuffer, load_image},
  model::ModelWrapper,
  output::OutputWrapper,
  record::parse_answers,
  task::{BatchClassifyTask, ClassifyTask, Task, TrackTask},
};

use args::{Args, Command, ModelArgs};

fn load_classifier(models: &ModelArgs) -> Result<StageClassifier<ModelWrapper>> {
  info!("男性模型: {}", models.male_model);
  info!("女性模型: {}", models.female_model);
  let male = ModelWrapper::from_url(&models.male_model).context("加载男性分期模型失败")?;
  let female = ModelWrapper::from_url(&models.female_model).context("加载女性分期模型失败")?;
  Ok(StageClassifier::new(Arc::new(StageModels::new(male, female))))
}

fn load_images(urls: &[Url]) -> Result<Vec<ImageBuffer>> {
  urls
    .iter()
    .map(|url| load_image(url).with_context(|| format!("读取输入失败: {url}")))
    .collect()
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  match args.command {
    Command::Classify {
      models,
      category,
      input,
      answers,
      record,
    } => {
      let category: SubjectCategory = category.parse()?;
      let answers = parse_answers(answers.as_deref())?;
      let classifier = load_classifier(&models)?;
      let output = OutputWrapper::from_url(&record.output)?;
      let image = load_image(&input).with_context(|| format!("读取输入失败: {input}"))?;

      ClassifyTask {
        category,
        user_id: record.user,
        answers,
      }
      .run_task(image, &classifier, &output)?;
    }
    Command::Batch {
      models,
      category,
      input,
      workers,
      record,
    } => {
      let category: SubjectCategory = category.parse()?;
      let classifier = Arc::new(load_classifier(&models)?);
      let output = OutputWrapper::from_url(&record.output)?;

      let interrupted = Arc::new(AtomicBool::new(false));
      {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
          warn!("收到中断信号，处理完当前照片后退出...");
          interrupted.store(true, Ordering::Relaxed);
        })
        .context("无法设置 Ctrl-C 处理器")?;
      }

      BatchClassifyTask {
        category,
        user_id: record.user,
        workers,
        interrupted,
      }
      .run_task(input.into_iter(), classifier, &output)?;
    }
    Command::Track {
      input,
      timestamp,
      record,
    } => {
      let output = OutputWrapper::from_url(&record.output)?;
      let images = load_images(&input)?;

      TrackTask {
        user_id: record.user,
        timestamps: timestamp,
      }
      .run_task(images, &DensityTracker::default(), &output)?;
    }
  }

  Ok(())
}
