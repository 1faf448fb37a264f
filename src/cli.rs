use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{
    Adapter, AdapterConfig, DesktopAdapter, HtmlAdapter, NativeAdapter, TuiAdapter,
};
use crate::engine::{execute, MemoryDataSource, ScopeStore, Surfaces, Val};
use crate::hotreload;
use crate::parser::parse;
use crate::render::RenderOutput;
use crate::syntax::ScopeKind;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill - a declarative tagged-component language", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse, execute and render a component to a target artifact
    Render {
        /// Component source file
        file: String,

        /// Render target
        #[arg(short = 't', long = "target", default_value = "html")]
        target: Target,

        /// Seed a declared-scope variable (k=v, repeatable)
        #[arg(long = "set", value_name = "K=V")]
        set: Vec<String>,

        /// Document/window title
        #[arg(long, default_value = "quill component")]
        title: String,

        /// Render in dark mode
        #[arg(long)]
        dark: bool,
    },

    /// Parse a component and report errors without executing it
    Check {
        /// Component source file
        file: String,
    },

    /// Render two sources and print the hot-reload change messages
    Diff {
        /// Old component source file
        old: String,

        /// New component source file
        new: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Target {
    Html,
    Native,
    Tui,
    Desktop,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Render {
            file,
            target,
            set,
            title,
            dark,
        } => render_command(&file, target, &set, title, dark),
        Commands::Check { file } => check_command(&file),
        Commands::Diff { old, new } => diff_command(&old, &new),
    }
}

fn render_command(
    file: &str,
    target: Target,
    set: &[String],
    title: String,
    dark: bool,
) -> Result<()> {
    let output = run_pipeline(file, set)?;
    let config = AdapterConfig { title, dark };

    match target {
        Target::Html => {
            let result = HtmlAdapter.render(&output, &config);
            print_warnings(&result.warnings);
            println!("{}", result.artifact.document);
        }
        Target::Native => {
            let result = NativeAdapter.render(&output, &config);
            print_warnings(&result.warnings);
            println!("{}", serde_json::to_string_pretty(&result.artifact)?);
        }
        Target::Tui => {
            let result = TuiAdapter.render(&output, &config);
            print_warnings(&result.warnings);
            println!("{}", serde_json::to_string_pretty(&result.artifact)?);
        }
        Target::Desktop => {
            let result = DesktopAdapter.render(&output, &config);
            print_warnings(&result.warnings);
            println!("{}", serde_json::to_string_pretty(&result.artifact)?);
        }
    }
    Ok(())
}

fn check_command(file: &str) -> Result<()> {
    let source = fs::read_to_string(file).with_context(|| format!("cannot read {}", file))?;
    match parse(&source) {
        Ok(doc) => {
            println!("{}: ok ({} top-level nodes)", file, doc.roots.len());
            Ok(())
        }
        Err(e) => Err(anyhow!("{}: {}", file, e)),
    }
}

fn diff_command(old_file: &str, new_file: &str) -> Result<()> {
    let old_source =
        fs::read_to_string(old_file).with_context(|| format!("cannot read {}", old_file))?;
    let new_source =
        fs::read_to_string(new_file).with_context(|| format!("cannot read {}", new_file))?;

    let old_doc = parse(&old_source).map_err(|e| anyhow!("{}: {}", old_file, e))?;
    let new_doc = match parse(&new_source) {
        Ok(doc) => doc,
        // A broken edit surfaces as an error message, not a CLI failure
        Err(e) => {
            let message = hotreload::ReloadMessage::from_parse_error(&e);
            println!("{}", serde_json::to_string(&message)?);
            return Ok(());
        }
    };

    if let Some(reason) = hotreload::shape_change(&old_doc, &new_doc) {
        let message = hotreload::ReloadMessage::FullReload { reason };
        println!("{}", serde_json::to_string(&message)?);
        return Ok(());
    }

    let surfaces = default_surfaces();
    let old_output = execute(&old_doc, &mut ScopeStore::new(), &surfaces)
        .map_err(|e| anyhow!("{}: {}", old_file, e))?;
    let new_output = match execute(&new_doc, &mut ScopeStore::new(), &surfaces) {
        Ok(output) => output,
        Err(e) => {
            let message = hotreload::ReloadMessage::from_runtime_error(&e);
            println!("{}", serde_json::to_string(&message)?);
            return Ok(());
        }
    };

    let changes = hotreload::diff(&old_output, &new_output);
    if changes.is_empty() {
        println!("no changes");
        return Ok(());
    }
    for message in &changes.messages {
        println!("{}", serde_json::to_string(message)?);
    }
    Ok(())
}

fn run_pipeline(file: &str, set: &[String]) -> Result<RenderOutput> {
    let source = fs::read_to_string(file).with_context(|| format!("cannot read {}", file))?;
    let doc = parse(&source).map_err(|e| anyhow!("{}: {}", file, e))?;

    let mut scopes = ScopeStore::new();
    for pair in set {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects k=v, got '{}'", pair))?;
        scopes.set(key, Val::Str(value.to_string()), Some(ScopeKind::Declared));
    }

    let surfaces = default_surfaces();
    execute(&doc, &mut scopes, &surfaces).map_err(|e| anyhow!("{}: {}", file, e))
}

/// In-memory data source under the conventional name, so components with
/// queries render out of the box.
fn default_surfaces() -> Surfaces {
    Surfaces::new().with_datasource("main", Arc::new(MemoryDataSource::new()))
}

fn print_warnings(warnings: &[crate::error::CompatibilityWarning]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}
