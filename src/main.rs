//! Retratar CLI
//!
//! Training and sampling entry point for the retratar library.
//!
//! # Usage
//!
//! ```bash
//! # Train the standard objective on the default dataset layout
//! retratar train
//!
//! # Train the gradient-penalty objective with overrides
//! retratar train --variant wgan-gp --epoch 50 --learning-rate 0.0001
//!
//! # Resume a run from its checkpoint directory
//! retratar train --init-from save_DCGAN/faces_64_64_64
//!
//! # Render one grid from the latest checkpoint
//! retratar sample save_DCGAN/faces_64_64_64 --tag-id 17 --out grid.png
//! ```

use clap::Parser;
use retratar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
