//! viewforge CLI entrypoint
//! Renders views and inspects template resolution from the command line.
#![deny(unsafe_code)]

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::sync::Arc;

// External imports (alphabetized)
use anyhow::{Context, bail};
use clap::Parser;
use serde_json::Value as JsonValue;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;
use viewforge_core::{Map, RenderRequest, ResolveKind, TemplateStore, ViewConfig, ViewModule};

#[derive(Parser)]
#[command(name = "viewforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand that touches the template tree
#[derive(clap::Args, Debug, Clone)]
pub struct ScopeArgs {
    /// View configuration file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Template root directory
    #[arg(long)]
    root: Option<PathBuf>,
    /// Name of the shared folder
    #[arg(long)]
    shared: Option<String>,
    /// Site scope
    #[arg(long)]
    site: Option<String>,
    /// Language scope
    #[arg(long, default_value = "en")]
    lang: String,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Render a view (a template name, or inline source containing a newline)
    Render {
        view: String,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Template data: a JSON file or an inline JSON object
        #[arg(long)]
        data: Option<String>,
        /// Model for the body pass, as JSON
        #[arg(long)]
        model: Option<String>,
        /// Write the page to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the lookup order for a template name
    Candidates {
        name: String,
        /// Lookup kind: body, layout or render
        #[arg(long, default_value = "body")]
        kind: ResolveKind,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so rendered pages can be piped
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            view,
            scope,
            data,
            model,
            output,
        } => render_view(view, &scope, data.as_deref(), model.as_deref(), output).await,
        Commands::Candidates { name, kind, scope } => print_candidates(&name, kind, &scope),
    }
}

fn load_config(scope: &ScopeArgs) -> anyhow::Result<ViewConfig> {
    let mut config = match &scope.config {
        Some(path) => ViewConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ViewConfig::default(),
    };
    if let Some(root) = &scope.root {
        config.root = root.clone();
    }
    if let Some(shared) = &scope.shared {
        config.shared = shared.clone();
    }
    config.fill_defaults();
    Ok(config)
}

/// Accept either a path to a JSON file or an inline JSON object
fn load_data(data: &str) -> anyhow::Result<Map> {
    let path = Path::new(data);
    let text = if path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file {}", path.display()))?
    } else {
        data.to_string()
    };

    match serde_json::from_str::<JsonValue>(&text).context("Failed to parse template data")? {
        JsonValue::Object(map) => Ok(map),
        other => bail!("Template data must be a JSON object, got {}", other),
    }
}

async fn render_view(
    view: String,
    scope: &ScopeArgs,
    data: Option<&str>,
    model: Option<&str>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(scope)?;

    let mut request = RenderRequest::new(view).with_language(scope.lang.clone());
    if let Some(site) = &scope.site {
        request = request.with_site(site.clone());
    }
    if let Some(data) = data {
        request = request.with_data(load_data(data)?);
    }
    if let Some(model) = model {
        let model: JsonValue =
            serde_json::from_str(model).context("Failed to parse model JSON")?;
        request = request.with_model(model);
    }

    let module = Arc::new(ViewModule::new());
    module
        .register_config(config)
        .context("Failed to register view configuration")?;
    module.open().context("Failed to open view module")?;
    module.start().context("Failed to start view module")?;

    let renderer = Arc::clone(&module);
    let page = tokio::task::spawn_blocking(move || renderer.parse(request))
        .await
        .context("Render task failed")?
        .context("Failed to render view")?;

    module.stop().context("Failed to stop view module")?;
    module.close().context("Failed to close view module")?;

    match output {
        Some(path) => {
            std::fs::write(&path, &page)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", page.len(), path.display());
        }
        None => print!("{page}"),
    }
    Ok(())
}

fn print_candidates(name: &str, kind: ResolveKind, scope: &ScopeArgs) -> anyhow::Result<()> {
    let config = load_config(scope)?;
    let store = TemplateStore::from_config(&config, scope.site.as_deref(), &scope.lang);
    let candidates = store.candidates(kind, name, None);
    debug!("{} candidates for {} '{}'", candidates.len(), kind, name);

    let mut selected = false;
    for candidate in &candidates {
        let exists = candidate.is_file();
        let marker = if exists && !selected { "*" } else { " " };
        selected |= exists;
        println!("{marker} {}", candidate.display());
    }
    if !selected {
        println!("no {kind} template named '{name}' was found");
    }
    Ok(())
}
