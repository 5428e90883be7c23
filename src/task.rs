// 该文件是 Hairscope （发镜） 项目的一部分。
// src/task.rs - 分析任务
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

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
  classifier::StageClassifier,
  frame::ScalpFrame,
  input::{FetchImage, ImageBuffer},
  model::{Model, Probabilities, SubjectCategory},
  output::Render,
  record::{PredictionRecord, TrackingRecord},
  tracker::DensityTracker,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 单张照片分期
pub struct ClassifyTask {
  pub category: SubjectCategory,
  pub user_id: String,
  pub answers: Map<String, Value>,
}

impl<M, ME, O, RE> Task<ImageBuffer, &StageClassifier<M>, &O> for ClassifyTask
where
  M: Model<Input = ScalpFrame, Output = Probabilities, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  O: Render<PredictionRecord, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: ImageBuffer,
    model: &StageClassifier<M>,
    output: &O,
  ) -> Result<(), Self::Error> {
    info!("开始分期: {} ({})", input.source(), self.category);
    let now = std::time::Instant::now();
    let result = model.classify(&input, self.category)?;
    info!("分期完成，耗时: {:.2?}", now.elapsed());

    let record = PredictionRecord::new(self.user_id, &result, self.answers);
    output.render_result(&record)?;
    Ok(())
  }
}

/// 多张照片分期，工作线程共享同一份只读模型
pub struct BatchClassifyTask {
  pub category: SubjectCategory,
  pub user_id: String,
  pub workers: usize,
  pub interrupted: Arc<AtomicBool>,
}

impl<I, M, ME, O, RE> Task<I, Arc<StageClassifier<M>>, &O> for BatchClassifyTask
where
  I: Iterator + Send,
  I::Item: FetchImage,
  M: Model<Input = ScalpFrame, Output = Probabilities, Error = ME> + Send + Sync,
  ME: std::error::Error + Send + Sync + 'static,
  O: Render<PredictionRecord, Error = RE> + Sync,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    model: Arc<StageClassifier<M>>,
    output: &O,
  ) -> Result<(), Self::Error> {
    let workers = self.workers.max(1);
    info!("开始批量分期，工作线程: {}", workers);

    let queue = Mutex::new(input);
    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let outcome: anyhow::Result<()> = std::thread::scope(|s| {
      let handles: Vec<_> = (0..workers)
        .map(|worker| {
          let model = Arc::clone(&model);
          let queue = &queue;
          let processed = &processed;
          let failed = &failed;
          let task = &self;
          s.spawn(move || -> anyhow::Result<()> {
            loop {
              if task.interrupted.load(Ordering::Relaxed) {
                warn!("({}) 中断信号接收，退出任务循环", worker);
                break;
              }
              let next = {
                let mut queue = queue
                  .lock()
                  .map_err(|_| anyhow::anyhow!("输入队列不可用"))?;
                queue.next()
              };
              let Some(item) = next else { break };

              // 在锁外读取，读取失败只跳过这一项
              let name = item.describe();
              let image = match item.fetch() {
                Ok(image) => image,
                Err(e) => {
                  warn!("({}) 跳过输入 {}: {}", worker, name, e);
                  failed.fetch_add(1, Ordering::Relaxed);
                  continue;
                }
              };

              // 单张失败不影响其余照片
              match model.classify(&image, task.category) {
                Ok(result) => {
                  let record = PredictionRecord::new(task.user_id.clone(), &result, Map::new());
                  output.render_result(&record)?;
                  processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                  warn!("({}) {} 分期失败: {}", worker, image.source(), e);
                  failed.fetch_add(1, Ordering::Relaxed);
                }
              }
            }
            Ok(())
          })
        })
        .collect();

      for handle in handles {
        handle
          .join()
          .map_err(|_| anyhow::anyhow!("工作线程异常退出"))??;
      }
      Ok(())
    });
    outcome?;

    info!(
      "批量分期完成: 成功 {}, 失败 {}",
      processed.load(Ordering::Relaxed),
      failed.load(Ordering::Relaxed)
    );
    Ok(())
  }
}

/// 四张照片的密度趋势
pub struct TrackTask {
  pub user_id: String,
  /// 与输入照片一一对应的原始时间戳文本
  pub timestamps: Vec<String>,
}

impl<O, RE> Task<Vec<ImageBuffer>, &DensityTracker, &O> for TrackTask
where
  O: Render<TrackingRecord, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: Vec<ImageBuffer>,
    model: &DensityTracker,
    output: &O,
  ) -> Result<(), Self::Error> {
    info!("开始密度追踪: {} 张照片", input.len());
    let now = std::time::Instant::now();
    let result = model.track_raw(&input, &self.timestamps)?;
    info!("追踪完成，耗时: {:.2?}", now.elapsed());

    output.render_result(&TrackingRecord::new(self.user_id, &result))?;
    Ok(())
  }
}
