//! Binary to generate/update expected.html and expected.err fixture files
//!
//! Usage:
//!   cargo run --bin accept_expected            # Update all
//!   cargo run --bin accept_expected -- layout  # Update only fixtures matching "layout"

use bacon_templates::{FsLoader, RenderOptions, Renderer, Value};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn main() {
    let filter: Option<String> = std::env::args().nth(1);
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to start runtime");

    let mut updated = 0;
    let mut skipped = 0;

    for entry in WalkDir::new(&fixtures)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == "index.tmpl")
    {
        let Some(dir) = entry.path().parent() else {
            continue;
        };

        // Apply filter if provided
        if let Some(ref f) = filter {
            if !dir.to_string_lossy().contains(f) {
                skipped += 1;
                continue;
            }
        }

        runtime.block_on(process_case(dir));
        updated += 1;
    }

    println!("Updated {} fixtures, skipped {}", updated, skipped);
}

async fn process_case(dir: &Path) {
    let data = match fs::read_to_string(dir.join("data.json")) {
        Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(data) => Value::from(data),
            Err(e) => {
                eprintln!("Invalid data.json in {:?}: {}", dir, e);
                return;
            }
        },
        Err(_) => Value::from(serde_json::json!({})),
    };

    let renderer = Renderer::with_options(FsLoader::new(dir), RenderOptions::default().template_root("views"));
    let (write, stale, contents) = match renderer.render("index.tmpl", data).await {
        Ok(output) => (dir.join("expected.html"), dir.join("expected.err"), output),
        Err(e) => (dir.join("expected.err"), dir.join("expected.html"), e.to_string()),
    };

    if let Err(e) = fs::write(&write, contents) {
        eprintln!("Failed to write {:?}: {}", write, e);
    } else {
        println!("  wrote {}", write.display());
    }
    if stale.exists() {
        let _ = fs::remove_file(&stale);
    }
}
