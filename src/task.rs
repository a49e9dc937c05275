// 该文件是 AclYolo 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  type Summary;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Summary, Self::Error>;
}

/// 任务执行统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TaskSummary {
  pub inputs: usize,
  pub detections: usize,
  pub times: Vec<Duration>,
}

impl TaskSummary {
  /// 跳过前 `warmup` 次的平均耗时
  pub fn average(&self, warmup: usize) -> Option<Duration> {
    let measured = self.times.iter().skip(warmup);
    let count = self.times.len().saturating_sub(warmup);
    if count == 0 {
      return None;
    }
    Some(measured.sum::<Duration>() / count as u32)
  }
}

/// 依次处理全部输入
#[derive(Default, Debug)]
pub struct SequentialTask {
  limit: Option<usize>,
}

impl SequentialTask {
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = F>,
  M: Model<Input = F, Output = crate::model::DetectResult, Error = ME>,
  O: Render<Error = RE>,
> Task<I, M, O> for SequentialTask
{
  type Error = anyhow::Error;
  type Summary = TaskSummary;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<Self::Summary, Self::Error> {
    info!("开始任务...");
    let mut summary = TaskSummary::default();
    for frame in input {
      if self.limit.map(|n| summary.inputs >= n).unwrap_or(false) {
        info!("达到指定数量 {}, 退出任务循环", summary.inputs);
        break;
      }

      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", summary.inputs, elapsed);
      for det in result.items.iter() {
        info!(
          "  - {}: {:.2}% at ({:.1}, {:.1}, {:.1}, {:.1})",
          det.label(),
          det.confidence() * 100.0,
          det.bbox().x1,
          det.bbox().y1,
          det.bbox().x2,
          det.bbox().y2
        );
      }
      output.render_result(&result)?;

      summary.inputs += 1;
      summary.detections += result.len();
      summary.times.push(elapsed);
    }

    if summary.inputs == 0 {
      return Err(anyhow::anyhow!("没有输入"));
    }
    info!(
      "任务完成: {} 个输入, {} 个检测结果",
      summary.inputs, summary.detections
    );
    Ok(summary)
  }
}

/// 对第一个输入重复推理，用于测量耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(repeat: usize) -> Self {
    Self { repeat }
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: IntoIterator<Item = F>,
  M: Model<Input = F, Output = crate::model::DetectResult, Error = ME>,
  O: Render<Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;
  type Summary = TaskSummary;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<Self::Summary, Self::Error> {
    info!("开始任务...");
    let frame = input
      .into_iter()
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入"))?;
    info!("输入获取成功，开始推理...");

    let mut summary = TaskSummary {
      inputs: 1,
      ..TaskSummary::default()
    };
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&result)?;
      summary.detections = result.len();
      summary.times.push(elapsed);
    }

    if let Some(avg) = summary.average(2) {
      warn!("平均推理时间: {:.2?}", avg);
    }
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{Candidate, DetectResult},
    nms::BoundingBox,
    output::NullOutput,
  };
  use std::path::PathBuf;

  struct StubModel;

  #[derive(Debug, thiserror::Error)]
  #[error("模型失败")]
  struct ModelFailure;

  impl Model for StubModel {
    type Input = PathBuf;
    type Output = DetectResult;
    type Error = ModelFailure;

    fn infer(&mut self, input: &PathBuf) -> Result<DetectResult, ModelFailure> {
      if input.as_os_str() == "bad.png" {
        return Err(ModelFailure);
      }
      Ok(DetectResult {
        source: input.clone(),
        tensor_size: (640, 640),
        items: vec![Candidate::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, 0.5)]
          .into_boxed_slice(),
      })
    }
  }

  fn inputs(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
  }

  #[test]
  fn sequential_task_counts_inputs() {
    let model = StubModel;
    let summary = SequentialTask::default()
      .run_task(inputs(&["a.png", "b.png", "c.png"]), model, NullOutput)
      .unwrap();
    assert_eq!(summary.inputs, 3);
    assert_eq!(summary.detections, 3);
    assert_eq!(summary.times.len(), 3);
  }

  #[test]
  fn sequential_task_respects_limit() {
    let summary = SequentialTask::default()
      .with_limit(Some(2))
      .run_task(
        inputs(&["a.png", "b.png", "c.png"]),
        StubModel,
        NullOutput,
      )
      .unwrap();
    assert_eq!(summary.inputs, 2);
  }

  #[test]
  fn sequential_task_stops_on_error() {
    let err = SequentialTask::default()
      .run_task(
        inputs(&["a.png", "bad.png", "c.png"]),
        StubModel,
        NullOutput,
      )
      .unwrap_err();
    assert_eq!(err.to_string(), "模型失败");
  }

  #[test]
  fn empty_input_is_an_error() {
    assert!(
      SequentialTask::default()
        .run_task(inputs(&[]), StubModel, NullOutput)
        .is_err()
    );
    assert!(
      RepeatShotTask::with_repeat(3)
        .run_task(inputs(&[]), StubModel, NullOutput)
        .is_err()
    );
  }

  #[test]
  fn repeat_shot_reuses_first_input() {
    let summary = RepeatShotTask::with_repeat(5)
      .run_task(inputs(&["a.png", "b.png"]), StubModel, NullOutput)
      .unwrap();
    assert_eq!(summary.inputs, 1);
    assert_eq!(summary.times.len(), 5);
    assert!(summary.average(2).is_some());
    assert!(summary.average(5).is_none());
  }
}
