use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};

/// One fixture program: a `.jack` source with an optional `.vm` golden
/// output and an optional `.err` expected-error fragment beside it.
#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub source_path: PathBuf,
    pub expected_path: Option<PathBuf>,
    pub expected_error_path: Option<PathBuf>,
}

impl Case {
    pub fn source(&self) -> Result<String> {
        fs::read_to_string(&self.source_path)
            .with_context(|| format!("Reading {}", self.source_path.display()))
    }
}

pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in fs::read_dir(programs_dir)
        .with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("jack") {
            continue;
        }

        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid fixture file name {}", path.display()))?;
        let expected_path = Some(path.with_extension("vm")).filter(|p| p.exists());
        let expected_error_path = Some(path.with_extension("err")).filter(|p| p.exists());

        cases.push(Case {
            name,
            source_path: path,
            expected_path,
            expected_error_path,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No .jack programs found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}
