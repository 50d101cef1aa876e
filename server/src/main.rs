//! Hot wallet refill HTTP server entrypoint.

mod config;
mod db;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        process::exit(1);
    }
}
