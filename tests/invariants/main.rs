//! Canonical serialization invariants, checked over every fixture template:
//! printing a parsed template and parsing it again gives the same AST, and
//! printing is a fixed point.

use bacon_templates::{GenerateOptions, Generator, ParseOptions, Parser, SourceGenerator, TemplateParser};
use libtest_mimic::{Arguments, Failed, Trial};
use std::fs;
use std::path::{Path, PathBuf};

fn collect_templates() -> Vec<PathBuf> {
    let pattern = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/**/*.tmpl");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .expect("valid glob pattern")
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    files
}

fn check_round_trip(path: &Path) -> Result<(), Failed> {
    let source = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let parser = TemplateParser::with_options(ParseOptions::default().with_positions(false));
    let Ok(template) = parser.parse(&source) else {
        // Fixtures for parse errors have nothing to print
        return Ok(());
    };

    let generator = SourceGenerator::new();
    let printed = generator.generate(&template, &GenerateOptions::default()).code;
    let reparsed = parser
        .parse(&printed)
        .map_err(|e| format!("canonical form does not parse: {}\n--- printed ---\n{}", e, printed))?;
    if reparsed != template {
        return Err(format!("AST changed after printing\n--- printed ---\n{}", printed).into());
    }

    let reprinted = generator.generate(&reparsed, &GenerateOptions::default()).code;
    if reprinted != printed {
        return Err(format!("printing is not stable\n--- first ---\n{}\n--- second ---\n{}", printed, reprinted).into());
    }
    Ok(())
}

fn main() {
    let args = Arguments::from_args();
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let trials: Vec<Trial> = collect_templates()
        .into_iter()
        .map(|path| {
            let name = path.strip_prefix(&root).unwrap_or(&path).to_string_lossy().replace('/', "::");
            Trial::test(format!("round_trip::{}", name), move || check_round_trip(&path))
        })
        .collect();
    libtest_mimic::run(&args, trials).exit();
}
