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

use anyhow::Result;
use clap::Args as ClapArgs;
use common::get_network;

use crate::checkpoint::CheckpointSpec;
use crate::EvalBackend;

#[derive(ClapArgs, Debug)]
pub struct Args {
    #[arg(long = "model_name", default_value = "inception_v3")]
    model_name: String,
    /// Checkpoint record, or a directory resolved to its latest record.
    #[arg(long = "checkpoint_path")]
    checkpoint_path: String,
    /// Output classes the record was trained with.
    #[arg(long = "num_classes", default_value_t = 1001)]
    num_classes: usize,
}

pub fn execute(args: &Args) -> Result<()> {
    let device = Default::default();
    let path = CheckpointSpec::parse(args.checkpoint_path.trim()).resolve()?;
    println!(
        "Verifying {} record for {} ({} classes)",
        path.display(),
        args.model_name,
        args.num_classes
    );
    let network = get_network::<EvalBackend>(&args.model_name, args.num_classes, &device)?;
    let network = network.restore(&path, &device)?;
    let size = network.input_size(None);
    println!(
        "Record is compatible with {} (input {}x{}x{})",
        network.spec().name,
        size.channels,
        size.height,
        size.width
    );
    Ok(())
}
