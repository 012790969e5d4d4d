//! Output file naming

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub const DEFAULT_OUTPUT_PREFIX: &str = "processed-";

/// `<dir>/<prefix><file name>` for each input
///
/// Without `output_dir` each output lands next to its input. Two inputs
/// that would map to the same output are rejected.
pub fn output_paths(inputs: &[PathBuf], output_dir: Option<&Path>, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut outputs = Vec::with_capacity(inputs.len());

    for input in inputs {
        let name = input
            .file_name()
            .with_context(|| format!("{:?} has no file name", input))?;
        let dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let mut file_name = prefix.to_owned();
        file_name.push_str(&name.to_string_lossy());
        let output = dir.join(file_name);

        if output == *input {
            bail!("output for {:?} would overwrite the input", input);
        }
        if !seen.insert(output.clone()) {
            bail!("two inputs map to the same output {:?}", output);
        }
        outputs.push(output);
    }
    Ok(outputs)
}
