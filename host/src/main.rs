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

mod checkpoint;
mod commands;
mod config;
mod dataset;
mod error;
mod pipeline;
mod provider;
mod run;
mod scorer;

use clap::{Parser, Subcommand};
use env_logger::Env;

#[cfg(not(feature = "wgpu"))]
type EvalBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
type EvalBackend = burn::backend::Wgpu;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate checkpoints and their ensemble on a dataset split.
    Eval(commands::eval::Args),
    /// Check that a record restores into an architecture.
    VerifyModel(commands::verify_model::Args),
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Eval(args) => commands::eval::execute(&args),
        Commands::VerifyModel(args) => commands::verify_model::execute(&args),
    }
}
