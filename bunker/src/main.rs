//! Novel Bunker headless shell.
//!
//! A line-oriented interface to a manuscript store, for scripting and for
//! driving the editor without a UI:
//!
//! ```bash
//! cargo run -p bunker -- --store novel.json --demo
//! ```
//!
//! Log output goes to stderr and is controlled by `RUST_LOG`.

mod headless;

use bunker_core::{EditorConfig, HeadlessConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = parse_config_from_args(&args, EditorConfig::from_env()?);
    headless::run(config).await.map_err(|e| e.into())
}

/// Apply command line flags on top of the environment configuration.
fn parse_config_from_args(args: &[String], editor: EditorConfig) -> HeadlessConfig {
    let mut config = HeadlessConfig::new(editor);
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--store" => {
                if let Some(path) = iter.next() {
                    config.editor = config.editor.with_store_path(path);
                }
            }
            "--demo" => config = config.with_demo(),
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
    }

    config
}

fn print_help() {
    println!("bunker - headless manuscript editor");
    println!();
    println!("USAGE:");
    println!("    bunker [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --store <path>    Store file (default: in memory, or BUNKER_STORE_PATH)");
    println!("    --demo            Seed a sample manuscript into an empty store");
    println!("    -h, --help        Print this help");
    println!();
    println!("ENVIRONMENT:");
    println!("    ANTHROPIC_API_KEY            Enables AI feedback and grammar checks");
    println!("    BUNKER_MODEL                 Model for AI requests");
    println!("    BUNKER_TITLE_DEBOUNCE_MS     Title autosave delay (default 500)");
    println!("    BUNKER_CONTENT_DEBOUNCE_MS   Content autosave delay (default 1000)");
    println!("    RUST_LOG                     Log filter, e.g. bunker_core=debug");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("bunker")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_flags_override_environment() {
        let env = EditorConfig::default().with_store_path("/from/env.json");
        let config = parse_config_from_args(&args(&["--store", "local.json", "--demo"]), env);

        assert!(config.seed_demo);
        assert_eq!(
            config.editor.store_path.as_deref(),
            Some(std::path::Path::new("local.json"))
        );
    }

    #[test]
    fn test_no_flags_keeps_environment() {
        let env = EditorConfig::default().with_store_path("/from/env.json");
        let config = parse_config_from_args(&args(&[]), env);

        assert!(!config.seed_demo);
        assert_eq!(
            config.editor.store_path.as_deref(),
            Some(std::path::Path::new("/from/env.json"))
        );
    }
}
