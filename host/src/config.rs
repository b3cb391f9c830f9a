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

use std::path::Path;

use burn::config::Config;

use crate::error::EvalError;

/// Every knob of an evaluation run. Built from the `eval` flags or loaded from JSON.
#[derive(Config, Debug)]
pub struct EvalConfig {
    /// The number of samples in each batch.
    #[config(default = 100)]
    pub batch_size: usize,
    /// Max number of batches to evaluate; unset or zero means one pass over the split.
    pub max_num_batches: Option<usize>,
    /// Address of a remote execution master. Accepted for compatibility, ignored.
    #[config(default = "String::new()")]
    pub master: String,
    /// Comma-separated checkpoint directories or files.
    #[config(default = "String::from(\"/tmp/tfmodel/\")")]
    pub checkpoint_path: String,
    /// Accepted for compatibility, unused.
    #[config(default = "String::from(\"/tmp/tfmodel/\")")]
    pub eval_dir: String,
    #[config(default = 1)]
    pub num_preprocessing_threads: usize,
    #[config(default = "String::from(\"imagenet\")")]
    pub dataset_name: String,
    #[config(default = "String::from(\"test\")")]
    pub dataset_split_name: String,
    pub dataset_dir: Option<String>,
    /// Subtracted from every label; networks are built with that many fewer classes.
    #[config(default = 0)]
    pub labels_offset: usize,
    #[config(default = "String::from(\"inception_v3\")")]
    pub model_name: String,
    pub preprocessing_name: Option<String>,
    /// Accepted for compatibility, unused.
    pub moving_average_decay: Option<f64>,
    pub eval_image_size: Option<usize>,
    /// Where to write the JSON report. Nothing is written when unset.
    pub report_path: Option<String>,
}

impl EvalConfig {
    /// The dataset directory is the one mandatory setting.
    pub fn dataset_dir(&self) -> Result<&Path, EvalError> {
        match self.dataset_dir.as_deref() {
            Some(dir) if !dir.is_empty() => Ok(Path::new(dir)),
            _ => Err(EvalError::MissingDatasetDir),
        }
    }

    /// The explicitly requested preprocessing; `None` means the model's default.
    pub fn preprocessing_name(&self) -> Option<&str> {
        self.preprocessing_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        self.dataset_dir()?;
        if self.batch_size == 0 {
            return Err(EvalError::InvalidBatchSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_flag_table() {
        let config = EvalConfig::new();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_num_batches, None);
        assert_eq!(config.checkpoint_path, "/tmp/tfmodel/");
        assert_eq!(config.num_preprocessing_threads, 1);
        assert_eq!(config.dataset_name, "imagenet");
        assert_eq!(config.dataset_split_name, "test");
        assert_eq!(config.labels_offset, 0);
        assert_eq!(config.model_name, "inception_v3");
        assert_eq!(config.preprocessing_name(), None);
    }

    #[test]
    fn missing_dataset_dir_is_a_configuration_error() {
        let config = EvalConfig::new();
        assert!(matches!(config.validate(), Err(EvalError::MissingDatasetDir)));

        let config = EvalConfig::new().with_dataset_dir(Some(String::new()));
        assert!(matches!(config.validate(), Err(EvalError::MissingDatasetDir)));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = EvalConfig::new()
            .with_dataset_dir(Some("/data".into()))
            .with_batch_size(0);
        assert!(matches!(config.validate(), Err(EvalError::InvalidBatchSize)));
    }

    #[test]
    fn explicit_preprocessing_wins_over_model_name() {
        let config = EvalConfig::new()
            .with_model_name("resnet_v1_50".into())
            .with_preprocessing_name(Some("inception".into()));
        assert_eq!(config.preprocessing_name(), Some("inception"));
    }

    #[test]
    fn round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.json");
        let config = EvalConfig::new()
            .with_dataset_dir(Some("/data/flowers".into()))
            .with_dataset_name("flowers".into())
            .with_max_num_batches(Some(3));
        config.save(&path).unwrap();

        let loaded = EvalConfig::load(&path).unwrap();
        assert_eq!(loaded.dataset_dir.as_deref(), Some("/data/flowers"));
        assert_eq!(loaded.dataset_name, "flowers");
        assert_eq!(loaded.max_num_batches, Some(3));
        assert_eq!(loaded.batch_size, 100);
    }
}
