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

//! Turns the `--checkpoint_path` list into concrete record files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use common::CheckpointFormat;

use crate::error::EvalError;

const STATE_FILE: &str = "checkpoint";
const STATE_KEY: &str = "model_checkpoint_path:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointSpec {
    /// Resolved to the most recent checkpoint inside.
    Directory(PathBuf),
    /// Used as is; a missing file only fails at restore time.
    File(PathBuf),
}

impl CheckpointSpec {
    pub fn parse(path: &str) -> Self {
        let path = PathBuf::from(path);
        if path.is_dir() {
            CheckpointSpec::Directory(path)
        } else {
            CheckpointSpec::File(path)
        }
    }

    /// Splits a comma-separated list; blank entries are skipped.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, EvalError> {
        let specs: Vec<_> = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::parse)
            .collect();
        if specs.is_empty() {
            return Err(EvalError::EmptyCheckpointList(list.to_string()));
        }
        Ok(specs)
    }

    pub fn resolve(&self) -> Result<PathBuf, EvalError> {
        match self {
            CheckpointSpec::Directory(dir) => latest_checkpoint(dir),
            CheckpointSpec::File(path) => Ok(path.clone()),
        }
    }
}

pub fn resolve_checkpoints(list: &str) -> Result<Vec<PathBuf>, EvalError> {
    CheckpointSpec::parse_list(list)?
        .iter()
        .map(CheckpointSpec::resolve)
        .collect()
}

/// Most recent checkpoint in `dir`: the state file if present, then the highest
/// `<name>-<epoch>` record, then the newest record by modification time.
pub fn latest_checkpoint(dir: &Path) -> Result<PathBuf, EvalError> {
    if let Some(path) = read_state_file(dir)? {
        return Ok(path);
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && CheckpointFormat::from_path(&path).is_some() {
            let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            records.push((path, modified));
        }
    }
    records.sort();

    let by_epoch = records
        .iter()
        .filter_map(|(path, _)| checkpoint_epoch(path).map(|epoch| (epoch, path)))
        .max_by_key(|(epoch, _)| *epoch);
    if let Some((_, path)) = by_epoch {
        return Ok(path.clone());
    }

    records
        .into_iter()
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
        .ok_or_else(|| EvalError::NoCheckpointFound(dir.to_path_buf()))
}

fn read_state_file(dir: &Path) -> Result<Option<PathBuf>, EvalError> {
    let state = dir.join(STATE_FILE);
    if !state.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&state)?;
    let path = content
        .lines()
        .filter_map(|line| line.trim().strip_prefix(STATE_KEY))
        .map(|value| value.trim().trim_matches('"'))
        .find(|value| !value.is_empty())
        .map(|value| dir.join(value));
    Ok(path)
}

/// Epoch of a `<name>-<epoch>.<ext>` file.
fn checkpoint_epoch(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let (_, epoch) = stem.rsplit_once('-')?;
    epoch.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"record").unwrap();
        path
    }

    #[test]
    fn files_are_taken_verbatim() {
        let specs = CheckpointSpec::parse_list("/nowhere/a.mpk, /nowhere/b.bin").unwrap();
        assert_eq!(
            specs,
            vec![
                CheckpointSpec::File("/nowhere/a.mpk".into()),
                CheckpointSpec::File("/nowhere/b.bin".into()),
            ]
        );
        assert_eq!(
            resolve_checkpoints("/nowhere/a.mpk").unwrap(),
            vec![PathBuf::from("/nowhere/a.mpk")]
        );
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            CheckpointSpec::parse_list(" , ,"),
            Err(EvalError::EmptyCheckpointList(_))
        ));
    }

    #[test]
    fn directory_resolves_to_highest_epoch() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "model-2.mpk");
        let latest = touch(dir.path(), "model-10.mpk");
        touch(dir.path(), "model-9.bin");
        touch(dir.path(), "notes-99.txt");

        let list = dir.path().to_str().unwrap();
        assert_eq!(resolve_checkpoints(list).unwrap(), vec![latest]);
    }

    #[test]
    fn state_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "model-10.mpk");
        let chosen = touch(dir.path(), "best.mpk");
        fs::write(
            dir.path().join(STATE_FILE),
            "model_checkpoint_path: \"best.mpk\"\nall_model_checkpoint_paths: \"best.mpk\"\n",
        )
        .unwrap();

        assert_eq!(latest_checkpoint(dir.path()).unwrap(), chosen);
    }

    #[test]
    fn unnumbered_records_fall_back_to_any_record() {
        let dir = tempfile::tempdir().unwrap();
        let only = touch(dir.path(), "weights.bin");
        assert_eq!(latest_checkpoint(dir.path()).unwrap(), only);
    }

    #[test]
    fn directory_without_records_fails() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.txt");
        assert!(matches!(
            latest_checkpoint(dir.path()),
            Err(EvalError::NoCheckpointFound(_))
        ));
    }

    #[test]
    fn mixed_list_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let latest = touch(dir.path(), "model-3.mpk");
        let list = format!("/nowhere/first.bin,{}", dir.path().display());
        assert_eq!(
            resolve_checkpoints(&list).unwrap(),
            vec![PathBuf::from("/nowhere/first.bin"), latest]
        );
    }
}
