// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::path::PathBuf;

use anyhow::Result;
use burn::config::Config;
use clap::Parser;
use log::info;
use proto::{Accuracy, EvaluationReport};

use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::EvalBackend;

#[derive(Parser, Debug)]
pub struct Args {
    /// The number of samples in each batch.
    #[arg(long = "batch_size", default_value_t = 100)]
    batch_size: usize,
    /// Max number of batches to evaluate; by default use all.
    #[arg(long = "max_num_batches")]
    max_num_batches: Option<usize>,
    /// The address of the execution master (ignored).
    #[arg(long, default_value = "")]
    master: String,
    /// Comma-separated checkpoint directories or files.
    #[arg(long = "checkpoint_path", default_value = "/tmp/tfmodel/")]
    checkpoint_path: String,
    /// Directory where the results are saved to (unused).
    #[arg(long = "eval_dir", default_value = "/tmp/tfmodel/")]
    eval_dir: String,
    /// The number of threads used to create the batches.
    #[arg(long = "num_preprocessing_threads", default_value_t = 1)]
    num_preprocessing_threads: usize,
    #[arg(long = "dataset_name", default_value = "imagenet")]
    dataset_name: String,
    #[arg(long = "dataset_split_name", default_value = "test")]
    dataset_split_name: String,
    /// The directory where the dataset files are stored.
    #[arg(long = "dataset_dir")]
    dataset_dir: Option<String>,
    /// Offset subtracted from every label, for models trained without a background class.
    #[arg(long = "labels_offset", default_value_t = 0)]
    labels_offset: usize,
    #[arg(long = "model_name", default_value = "inception_v3")]
    model_name: String,
    /// Defaults to the preprocessing of `--model_name`.
    #[arg(long = "preprocessing_name")]
    preprocessing_name: Option<String>,
    /// Accepted for compatibility (ignored).
    #[arg(long = "moving_average_decay")]
    moving_average_decay: Option<f64>,
    /// Defaults to the native input size of the model.
    #[arg(long = "eval_image_size")]
    eval_image_size: Option<usize>,
    /// Load every setting above from a JSON file instead.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the accuracies as a JSON report.
    #[arg(long = "report_path")]
    report_path: Option<String>,
}

impl Args {
    fn to_config(&self) -> Result<EvalConfig, EvalError> {
        let config = match &self.config {
            Some(path) => EvalConfig::load(path)
                .map_err(|err| EvalError::Config(format!("{}: {err:?}", path.display())))?,
            None => EvalConfig::new()
                .with_batch_size(self.batch_size)
                .with_max_num_batches(self.max_num_batches)
                .with_master(self.master.clone())
                .with_checkpoint_path(self.checkpoint_path.clone())
                .with_eval_dir(self.eval_dir.clone())
                .with_num_preprocessing_threads(self.num_preprocessing_threads)
                .with_dataset_name(self.dataset_name.clone())
                .with_dataset_split_name(self.dataset_split_name.clone())
                .with_dataset_dir(self.dataset_dir.clone())
                .with_labels_offset(self.labels_offset)
                .with_model_name(self.model_name.clone())
                .with_preprocessing_name(self.preprocessing_name.clone())
                .with_moving_average_decay(self.moving_average_decay)
                .with_eval_image_size(self.eval_image_size),
        };
        Ok(match &self.report_path {
            Some(path) => config.with_report_path(Some(path.clone())),
            None => config,
        })
    }
}

fn print_accuracy(accuracy: &Accuracy) {
    println!("Top 1 accuracy: {:.6}", accuracy.top1);
    println!("Top 5 accuracy: {:.6}", accuracy.top5);
}

fn print_report(report: &EvaluationReport) {
    for (i, model) in report.models.iter().enumerate() {
        println!("Model {}: {}", i, model.checkpoint);
        print_accuracy(&model.accuracy);
    }
    println!("Ensemble of {} models:", report.models.len());
    print_accuracy(&report.ensemble);
}

pub fn execute(args: &Args) -> Result<()> {
    let config = args.to_config()?;
    let device = Default::default();
    let report = crate::run::run::<EvalBackend>(&config, &device)?;
    print_report(&report);

    if let Some(path) = &config.report_path {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)?;
        info!("Report written to {}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_use_underscored_names_and_defaults() {
        let args = Args::parse_from([
            "eval",
            "--dataset_dir=/data/imagenet",
            "--checkpoint_path",
            "/models/a,/models/b",
            "--max_num_batches=5",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.dataset_dir.as_deref(), Some("/data/imagenet"));
        assert_eq!(config.checkpoint_path, "/models/a,/models/b");
        assert_eq!(config.max_num_batches, Some(5));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.model_name, "inception_v3");
        assert_eq!(config.report_path, None);
    }

    #[test]
    fn config_file_replaces_flags_but_keeps_report_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.json");
        EvalConfig::new()
            .with_dataset_name("flowers".into())
            .with_batch_size(8)
            .save(&path)
            .unwrap();

        let args = Args::parse_from([
            "eval",
            "--config",
            path.to_str().unwrap(),
            "--batch_size=3",
            "--report_path=out.json",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.dataset_name, "flowers");
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.report_path.as_deref(), Some("out.json"));
    }

    #[test]
    fn unreadable_config_file_is_a_config_error() {
        let args = Args::parse_from(["eval", "--config", "/nonexistent/eval.json"]);
        assert!(matches!(args.to_config(), Err(EvalError::Config(_))));
    }
}
