// 该文件是 Hairscope （发镜） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::{Args as ClapArgs, Parser, Subcommand};
use url::Url;

use hairscope::input::source_url;

/// Hairscope 头皮照片分析
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 单张照片脱发分期
  Classify {
    #[command(flatten)]
    models: ModelArgs,
    /// 受检对象类别（male / female）
    #[arg(long)]
    category: String,
    /// 输入照片（image:// URL 或本地路径）
    #[arg(long, value_name = "SOURCE", value_parser = source_url)]
    input: Url,
    /// 问卷答案（JSON 对象）
    #[arg(long, value_name = "JSON")]
    answers: Option<String>,
    #[command(flatten)]
    record: RecordArgs,
  },
  /// 多张照片批量分期
  Batch {
    #[command(flatten)]
    models: ModelArgs,
    /// 受检对象类别（male / female）
    #[arg(long)]
    category: String,
    /// 输入照片，可重复
    #[arg(long, value_name = "SOURCE", value_parser = source_url, required = true)]
    input: Vec<Url>,
    /// 工作线程数
    #[arg(long, default_value = "2", value_name = "COUNT")]
    workers: usize,
    #[command(flatten)]
    record: RecordArgs,
  },
  /// 四张照片的头发密度趋势
  Track {
    /// 输入照片，恰好四张
    #[arg(long, value_name = "SOURCE", value_parser = source_url, required = true)]
    input: Vec<Url>,
    /// 拍摄时间（RFC 3339 / ISO 8601），与照片一一对应
    #[arg(long, value_name = "TIME", required = true)]
    timestamp: Vec<String>,
    #[command(flatten)]
    record: RecordArgs,
  },
}

#[derive(ClapArgs, Debug)]
pub struct ModelArgs {
  /// 男性分期模型 URL（如 rknn:///models/male.rknn）
  #[arg(long, value_name = "MODEL")]
  pub male_model: Url,
  /// 女性分期模型 URL
  #[arg(long, value_name = "MODEL")]
  pub female_model: Url,
}

#[derive(ClapArgs, Debug)]
pub struct RecordArgs {
  /// 调用方提供的用户标识
  #[arg(long, default_value = "anonymous", value_name = "ID")]
  pub user: String,
  /// 输出位置（stdout: 或 folder:///path）
  #[arg(long, default_value = "stdout:", value_name = "OUTPUT")]
  pub output: Url,
}
