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

//! Entry point of an evaluation run: resolve, evaluate each checkpoint, score.

use burn::tensor::backend::Backend;
use log::{info, warn};
use proto::{EvaluationReport, ModelReport};

use crate::checkpoint::resolve_checkpoints;
use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::pipeline::{evaluate_checkpoint, CheckpointOutput};
use crate::scorer::{score, score_ensemble};

fn warn_ignored(config: &EvalConfig) {
    if !config.master.is_empty() {
        warn!("--master={} is ignored; evaluation runs in process", config.master);
    }
    if let Some(decay) = config.moving_average_decay {
        warn!("--moving_average_decay={} is ignored; records hold final weights", decay);
    }
}

/// Evaluates every checkpoint of `config.checkpoint_path` and their ensemble.
pub fn run<B: Backend>(config: &EvalConfig, device: &B::Device) -> Result<EvaluationReport, EvalError> {
    config.validate()?;
    let dataset_dir = config.dataset_dir()?;
    warn_ignored(config);

    let checkpoints = resolve_checkpoints(&config.checkpoint_path)?;
    for checkpoint in &checkpoints {
        info!("Evaluating {}", checkpoint.display());
    }

    let outputs = checkpoints
        .iter()
        .map(|checkpoint| evaluate_checkpoint::<B>(config, dataset_dir, checkpoint, device))
        .collect::<Result<Vec<CheckpointOutput>, _>>()?;

    let mut models = Vec::with_capacity(outputs.len());
    for output in &outputs {
        let accuracy = score::<B>(&output.logits, &output.labels, device)?;
        models.push(ModelReport {
            checkpoint: output.checkpoint.display().to_string(),
            accuracy,
        });
    }

    let logits: Vec<_> = outputs.iter().map(|output| &output.logits).collect();
    let labels: Vec<_> = outputs.iter().map(|output| &output.labels).collect();
    let ensemble = score_ensemble::<B>(&logits, &labels, device)?;

    Ok(EvaluationReport {
        model_name: config.model_name.clone(),
        dataset_name: config.dataset_name.clone(),
        dataset_split_name: config.dataset_split_name.clone(),
        num_batches: outputs.first().map_or(0, |output| output.num_batches),
        batch_size: config.batch_size,
        models,
        ensemble,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::write_image_folder;
    use burn::backend::NdArray;
    use common::get_network;

    type B = NdArray<f32>;

    fn cifar_config(data: &std::path::Path, checkpoints: &str) -> EvalConfig {
        EvalConfig::new()
            .with_dataset_name("cifar10".into())
            .with_dataset_split_name("test".into())
            .with_dataset_dir(Some(data.display().to_string()))
            .with_model_name("lenet".into())
            .with_checkpoint_path(checkpoints.to_string())
            .with_batch_size(4)
            .with_num_preprocessing_threads(3)
    }

    #[test]
    fn repeated_checkpoint_ensemble_matches_each_model() {
        let data = tempfile::tempdir().unwrap();
        write_image_folder(data.path(), "test", &["cat", "dog", "frog"], 3);

        let models = tempfile::tempdir().unwrap();
        let device = Default::default();
        get_network::<B>("lenet", 10, &device)
            .unwrap()
            .save(&models.path().join("lenet-2.mpk"))
            .unwrap();

        let dir = models.path().display().to_string();
        let config = cifar_config(data.path(), &format!("{dir}, {dir}"));
        let report = run::<B>(&config, &device).unwrap();

        assert_eq!(report.num_batches, 3);
        assert_eq!(report.models.len(), 2);
        assert!(report.models[0].checkpoint.ends_with("lenet-2.mpk"));
        for model in &report.models {
            assert_eq!(model.accuracy.count, 12);
            assert!(model.accuracy.top1 <= model.accuracy.top5);
        }
        assert_eq!(report.models[0].accuracy, report.models[1].accuracy);
        assert_eq!(report.ensemble, report.models[0].accuracy);
    }

    #[test]
    fn batch_cap_limits_the_rows_scored() {
        let data = tempfile::tempdir().unwrap();
        write_image_folder(data.path(), "test", &["cat", "dog"], 4);

        let device = Default::default();
        let checkpoint = data.path().join("model.bin");
        get_network::<B>("lenet", 10, &device)
            .unwrap()
            .save(&checkpoint)
            .unwrap();

        let config = cifar_config(data.path(), &checkpoint.display().to_string())
            .with_max_num_batches(Some(1));
        let report = run::<B>(&config, &device).unwrap();
        assert_eq!(report.num_batches, 1);
        assert_eq!(report.ensemble.count, 4);
    }

    #[test]
    fn missing_dataset_dir_fails_before_resolution() {
        let device = Default::default();
        let config = EvalConfig::new().with_checkpoint_path("/nonexistent/dir/".into());
        assert!(matches!(
            run::<B>(&config, &device),
            Err(EvalError::MissingDatasetDir)
        ));
    }

    #[test]
    fn missing_checkpoint_file_fails_at_restore() {
        let data = tempfile::tempdir().unwrap();
        write_image_folder(data.path(), "test", &["cat"], 1);
        let device = Default::default();
        let config = cifar_config(data.path(), "/nonexistent/model-1.mpk");
        assert!(matches!(
            run::<B>(&config, &device),
            Err(EvalError::Net(common::NetError::Restore { .. }))
        ));
    }
}
