//! Renders every fixture under tests/fixtures and compares the result with
//! its expected.html, or with the error text in expected.err.
//!
//! Run with: cargo test --test expected_tests
//! Regenerate with: cargo run --bin accept_expected

use bacon_templates::{FsLoader, RenderOptions, Renderer, Value};
use libtest_mimic::{Arguments, Failed, Trial};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixture directories, each holding an index.tmpl
fn collect_cases() -> Vec<PathBuf> {
    let pattern = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/*/index.tmpl");
    let mut cases: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .expect("valid glob pattern")
        .filter_map(|entry| entry.ok())
        .filter_map(|path| path.parent().map(Path::to_path_buf))
        .collect();
    cases.sort();
    cases
}

fn render_case(dir: &Path) -> Result<String, String> {
    let data = match fs::read_to_string(dir.join("data.json")) {
        Ok(text) => Value::from(serde_json::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string())?),
        Err(_) => Value::from(serde_json::json!({})),
    };
    let renderer = Renderer::with_options(FsLoader::new(dir), RenderOptions::default().template_root("views"));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| e.to_string())?;
    runtime
        .block_on(renderer.render("index.tmpl", data))
        .map_err(|e| e.to_string())
}

fn run_case(dir: &Path) -> Result<(), Failed> {
    let expected_html = dir.join("expected.html");
    let expected_err = dir.join("expected.err");
    let result = render_case(dir);

    if expected_err.exists() {
        let expected = fs::read_to_string(&expected_err).map_err(|e| e.to_string())?;
        return match result {
            Err(actual) if actual.trim() == expected.trim() => Ok(()),
            Err(actual) => Err(format!("Error mismatch\n--- expected ---\n{}\n--- actual ---\n{}", expected.trim(), actual.trim()).into()),
            Ok(output) => Err(format!("Expected an error, but rendered:\n{}", output).into()),
        };
    }

    let expected = fs::read_to_string(&expected_html)
        .map_err(|_| format!("Missing expected file: {}", expected_html.display()))?;
    match result {
        Ok(actual) if actual == expected => Ok(()),
        Ok(actual) => Err(format!("Output mismatch\n--- expected ---\n{}\n--- actual ---\n{}", expected, actual).into()),
        Err(e) => Err(format!("Render error: {}", e).into()),
    }
}

fn main() {
    let args = Arguments::from_args();
    let trials: Vec<Trial> = collect_cases()
        .into_iter()
        .map(|dir| {
            let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            Trial::test(format!("fixtures::{}", name), move || run_case(&dir))
        })
        .collect();
    libtest_mimic::run(&args, trials).exit();
}
