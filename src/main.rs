use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail, ensure};

use jackc::tokenizer::Tokenizer;
use jackc::{codegen, parser};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let directory = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if args.next().is_some() {
        bail!("Only one source directory is supported");
    }
    ensure!(
        directory.is_dir(),
        "'{}' is not a directory",
        directory.display()
    );

    let mut sources = Vec::new();
    for entry in fs::read_dir(&directory)
        .with_context(|| format!("Reading {}", directory.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("jack") {
            sources.push(path);
        }
    }
    ensure!(
        !sources.is_empty(),
        "No .jack files found in {}",
        directory.display()
    );
    sources.sort();

    for path in sources {
        let source =
            fs::read_to_string(&path).with_context(|| format!("Reading {}", path.display()))?;
        let mut tokens = Tokenizer::new(&source);
        let class =
            parser::parse(&mut tokens).with_context(|| format!("Compiling {}", path.display()))?;
        let output =
            codegen::compile(&class).with_context(|| format!("Compiling {}", path.display()))?;
        let target = directory.join(format!("{}.vm", class.name));
        fs::write(&target, output).with_context(|| format!("Writing {}", target.display()))?;
    }
    Ok(())
}
