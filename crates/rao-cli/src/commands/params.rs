use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rao_algo::{ParametersFormat, RaoParameters};

pub fn handle(out: Option<&Path>, format: ParametersFormat) -> Result<()> {
    let text = RaoParameters::default().render(format)?;
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing parameters {}", path.display()))?;
            println!("Default parameters written to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
