use bacon_templates::generate::{GenerateOptions, Generator, SourceGenerator};
use bacon_templates::loader::FsLoader;
use bacon_templates::parser::{ParseOptions, Parser as _, ScriptParser, TemplateParser};
use bacon_templates::transform::{DependencyPlugin, Transformer, standard_plugins};
use bacon_templates::{ParseError, RenderOptions, Renderer, Value};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bacon")]
#[command(about = "Bacon - asynchronous text templates with a restricted expression language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template to stdout
    Render {
        /// Template name, relative to the root
        name: String,

        /// Template root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// JSON file with the data
        #[arg(long, conflicts_with = "json")]
        data: Option<PathBuf>,

        /// Inline JSON data
        #[arg(long)]
        json: Option<String>,
    },
    /// Print the AST of a template (or script) as JSON
    Parse {
        /// Source file, or `-` for stdin
        file: PathBuf,

        /// Include source positions
        #[arg(long)]
        positions: bool,

        /// Parse as a script instead of a template
        #[arg(long)]
        script: bool,
    },
    /// Print a template (or script) in canonical form
    Fmt {
        /// Source file, or `-` for stdin
        file: PathBuf,

        /// Parse as a script instead of a template
        #[arg(long)]
        script: bool,
    },
    /// Parse every template under a directory and report problems
    Check {
        /// Template directory
        dir: PathBuf,

        /// Template file extension
        #[arg(long, default_value = "tmpl")]
        ext: String,

        /// Also report constructs rejected at render time
        #[arg(long)]
        lint: bool,
    },
    /// List the templates a template statically depends on
    Deps {
        /// Template name, relative to the root
        name: String,

        /// Template root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { name, root, data, json } => render(&name, &root, data, json).await,
        Commands::Parse { file, positions, script } => parse(&file, positions, script),
        Commands::Fmt { file, script } => format(&file, script),
        Commands::Check { dir, ext, lint } => check(&dir, &ext, lint),
        Commands::Deps { name, root } => deps(&name, &root).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("BACON_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn read_source(path: &Path) -> String {
    if path.as_os_str() == "-" {
        let mut source = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut source) {
            fail(format!("failed to read stdin: {}", e));
        }
        return source;
    }
    fs::read_to_string(path).unwrap_or_else(|e| fail(format!("failed to read {}: {}", path.display(), e)))
}

fn read_data(data: Option<PathBuf>, json: Option<String>) -> Value {
    let text = match (data, json) {
        (Some(path), _) => read_source(&path),
        (None, Some(json)) => json,
        (None, None) => return Value::from(serde_json::json!({})),
    };
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(data) => Value::from(data),
        Err(e) => fail(format!("invalid JSON data: {}", e)),
    }
}

fn print_parse_error(error: &ParseError, source: &str, filename: &str) {
    if io::stderr().is_terminal() {
        eprint!("{}", error.render_color(source, filename));
    } else {
        eprint!("{}", error.render(source, filename));
    }
}

async fn render(name: &str, root: &Path, data: Option<PathBuf>, json: Option<String>) {
    let data = read_data(data, json);
    let options = RenderOptions::default().template_root(root.display().to_string());
    let renderer = Renderer::with_options(FsLoader::new(root), options);
    match renderer.render(name, data).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("{}", e.stack_trace());
            std::process::exit(1);
        }
    }
}

fn parse(path: &Path, positions: bool, script: bool) {
    let source = read_source(path);
    let options = ParseOptions::default().with_positions(positions);
    let json = if script {
        ScriptParser::with_options(options)
            .parse(&source)
            .map(|program| serde_json::to_string_pretty(&program))
    } else {
        TemplateParser::with_options(options)
            .parse(&source)
            .map(|template| serde_json::to_string_pretty(&template))
    };
    match json {
        Ok(Ok(json)) => println!("{}", json),
        Ok(Err(e)) => fail(e),
        Err(e) => {
            print_parse_error(&e, &source, &path.display().to_string());
            std::process::exit(1);
        }
    }
}

fn format(path: &Path, script: bool) {
    let source = read_source(path);
    let options = ParseOptions::default().with_positions(false);
    let generator = SourceGenerator::new();
    let generated = if script {
        ScriptParser::with_options(options)
            .parse(&source)
            .map(|program| generator.generate_program(&program, &GenerateOptions::default()))
    } else {
        TemplateParser::with_options(options)
            .parse(&source)
            .map(|template| generator.generate(&template, &GenerateOptions::default()))
    };
    match generated {
        Ok(result) => print!("{}", result.code),
        Err(e) => {
            print_parse_error(&e, &source, &path.display().to_string());
            std::process::exit(1);
        }
    }
}

fn check(dir: &Path, ext: &str, lint: bool) {
    if !dir.is_dir() {
        fail(format!("{} is not a directory", dir.display()));
    }
    let start = Instant::now();
    let loader = FsLoader::new(dir);
    let names = loader.template_names(ext);
    if names.is_empty() {
        fail(format!("no .{} files found in {}", ext, dir.display()));
    }

    let mut problems = 0;
    for name in &names {
        let path = dir.join(name);
        let filename = path.display().to_string();
        let source = read_source(&path);
        let template = match TemplateParser::new().parse(&source) {
            Ok(template) => template,
            Err(e) => {
                print_parse_error(&e, &source, &filename);
                problems += 1;
                continue;
            }
        };
        if lint {
            let mut transformer = standard_plugins();
            for violation in &transformer.transform(&template).violations {
                let (line, col) = violation
                    .span
                    .map_or((0, 0), |span| (span.start.line + 1, span.start.col + 1));
                eprintln!("{}:{}:{}: {}", filename, line, col, violation.message);
                problems += 1;
            }
        }
    }

    print_summary(names.len(), problems, start.elapsed());
    if problems > 0 {
        std::process::exit(1);
    }
}

async fn deps(name: &str, root: &Path) {
    let renderer = Renderer::with_options(
        FsLoader::new(root),
        RenderOptions::default().template_root(root.display().to_string()),
    );
    if let Err(e) = renderer.preload(name).await {
        eprintln!("{}", e.stack_trace());
        std::process::exit(1);
    }

    // Everything reachable is cached now
    let mut seen = Vec::new();
    let mut queue = vec![name.to_string()];
    while let Some(name) = queue.pop() {
        if seen.contains(&name) {
            continue;
        }
        let Some(template) = renderer.cache().get(&name) else {
            continue;
        };
        let mut transformer = Transformer::new().add(DependencyPlugin);
        let metadata = transformer.transform(&template);
        println!("{}", name);
        for dependency in metadata.dependencies() {
            println!("  -> {}", dependency);
        }
        queue.extend(metadata.dependencies().into_iter().rev().map(str::to_string));
        seen.push(name);
    }
}

fn print_summary(count: usize, problems: usize, elapsed: std::time::Duration) {
    let is_tty = io::stderr().is_terminal();
    let time_str = format_duration(elapsed);
    let files_word = if count == 1 { "template" } else { "templates" };
    let problems_word = if problems == 1 { "problem" } else { "problems" };

    if is_tty {
        let mark = if problems == 0 { "\x1b[32m✓\x1b[0m" } else { "\x1b[31m✗\x1b[0m" };
        eprintln!("\n\x1b[1m{} Checked {} {} in {}, {} {}\x1b[0m", mark, count, files_word, time_str, problems, problems_word);
    } else {
        let mark = if problems == 0 { "✓" } else { "✗" };
        eprintln!("\n{} Checked {} {} in {}, {} {}", mark, count, files_word, time_str, problems, problems_word);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
