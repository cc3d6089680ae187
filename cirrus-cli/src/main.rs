use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;
use serde::Deserialize;

use cirrus_core::provider::{Provider, ResourceKind, ResourceType};
use cirrus_core::resource::{Resource, ResourceId, State, Value};
use cirrus_core::schema::ResourceSchema;
use cirrus_provider_huaweicloud::{Config, HuaweiCloudProvider};

#[derive(Parser)]
#[command(name = "cirrus")]
#[command(about = "Manage HuaweiCloud Identity Center and OBS resources", long_about = None)]
struct Cli {
    /// Provider settings file (JSON); overrides HW_* variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Region used when a resource doesn't set one
    #[arg(long, global = true)]
    region: Option<String>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resource types, or show the schema of one type
    Schema {
        /// Resource or data source type
        resource_type: Option<String>,
    },
    /// Validate a resource document against its schema
    Validate {
        /// Path to resource document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Create the resource described by a document
    Create {
        /// Path to resource document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Read the current state of a resource
    Read {
        resource_type: String,
        identifier: String,
    },
    /// Update a resource in place to match a document
    Update {
        resource_type: String,
        identifier: String,
        /// Path to resource document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete a resource
    Delete {
        resource_type: String,
        identifier: String,
        /// Path to resource document; the current state is read when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Import an existing resource by its identifier
    Import {
        resource_type: String,
        import_id: String,
    },
    /// Query a data source
    Query {
        /// Path to data source document
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Resource document read from a JSON file
#[derive(Debug, Deserialize)]
struct ResourceDocument {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

fn default_name() -> String {
    "this".to_string()
}

impl ResourceDocument {
    fn into_resource(self, read_only: bool) -> Resource {
        let mut resource = Resource::new(self.resource_type, self.name).with_read_only(read_only);
        resource.attributes = self.attributes;
        resource
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let result = match cli.command {
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
        Commands::Validate { file } => run_validate(&file),
        command => {
            let provider = match load_provider(cli.config.as_deref(), cli.region) {
                Ok(provider) => provider,
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    std::process::exit(1);
                }
            };
            run_command(&provider, command).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_command(provider: &HuaweiCloudProvider, command: Commands) -> Result<(), String> {
    match command {
        Commands::Create { file } => run_create(provider, &file).await,
        Commands::Read {
            resource_type,
            identifier,
        } => run_read(provider, &resource_type, &identifier).await,
        Commands::Update {
            resource_type,
            identifier,
            file,
        } => run_update(provider, &resource_type, &identifier, &file).await,
        Commands::Delete {
            resource_type,
            identifier,
            file,
            auto_approve,
        } => run_delete(provider, &resource_type, &identifier, file.as_deref(), auto_approve).await,
        Commands::Import {
            resource_type,
            import_id,
        } => run_import(provider, &resource_type, &import_id).await,
        Commands::Query { file } => run_query(provider, &file).await,
        Commands::Schema { .. } | Commands::Validate { .. } => unreachable!("handled without a provider"),
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings from `HW_*` variables, overridden by the file and then `--region`
fn load_config(path: Option<&Path>, region: Option<String>) -> Result<Config, String> {
    let mut config = Config::from_env().map_err(|e| e.to_string())?;
    if let Some(path) = path {
        let file = Config::from_file(path).map_err(|e| e.to_string())?;
        config = config.merge(file);
    }
    if region.is_some() {
        config.region = region;
    }
    Ok(config)
}

fn load_provider(path: Option<&Path>, region: Option<String>) -> Result<HuaweiCloudProvider, String> {
    let config = load_config(path, region)?;
    debug!("provider settings: {:?}", config);
    HuaweiCloudProvider::new(config).map_err(|e| e.to_string())
}

fn load_document(path: &Path) -> Result<ResourceDocument, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse_document(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

fn parse_document(content: &str) -> Result<ResourceDocument, serde_json::Error> {
    serde_json::from_str(content)
}

// =============================================================================
// Schema Commands
// =============================================================================

fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let mut types = cirrus_provider_huaweicloud::resources::resource_types();
    types.sort_by_key(|t| t.name());
    types
}

fn find_schema(resource_type: &str) -> Result<(ResourceKind, ResourceSchema), String> {
    resource_types()
        .into_iter()
        .find(|t| t.name() == resource_type)
        .map(|t| (t.kind(), t.schema()))
        .ok_or_else(|| format!("Unknown resource type: {}", resource_type))
}

fn run_schema(resource_type: Option<&str>) -> Result<(), String> {
    let Some(resource_type) = resource_type else {
        for t in resource_types() {
            println!("{:<40} {}", t.name().bold(), t.kind().to_string().dimmed());
        }
        return Ok(());
    };

    let (kind, schema) = find_schema(resource_type)?;
    println!("{} ({})", schema.resource_type.bold(), kind);
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }
    println!();
    for (name, attr) in schema.sorted_attributes() {
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required");
        }
        if attr.read_only {
            flags.push("read-only");
        } else if attr.computed {
            flags.push("computed");
        }
        if attr.force_new {
            flags.push("forces replacement");
        }
        if attr.non_updatable {
            flags.push("not updatable");
        }
        if attr.sensitive {
            flags.push("sensitive");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("  {} {}{}", name.cyan(), attr.attr_type, flags.dimmed());
    }
    Ok(())
}

fn run_validate(file: &Path) -> Result<(), String> {
    let document = load_document(file)?;
    let (_, schema) = find_schema(&document.resource_type)?;
    validate_attributes(&schema, &document.attributes)?;
    println!("{}", "Document is valid.".green().bold());
    Ok(())
}

fn validate_attributes(schema: &ResourceSchema, attributes: &HashMap<String, Value>) -> Result<(), String> {
    schema.validate(attributes).map_err(|errors| {
        let lines: Vec<String> = errors.iter().map(|e| format!("  {}", e)).collect();
        format!(
            "{} validation error(s) in {}:\n{}",
            errors.len(),
            schema.resource_type,
            lines.join("\n")
        )
    })
}

// =============================================================================
// Resource Commands
// =============================================================================

fn print_state(state: &State) -> Result<(), String> {
    let json = serde_json::to_string_pretty(&state.to_json()).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn run_create(provider: &HuaweiCloudProvider, file: &Path) -> Result<(), String> {
    let resource = load_document(file)?.into_resource(false);
    eprintln!("{} {}", "+".green().bold(), resource.id);

    let state = provider.create(&resource).await.map_err(|e| e.to_string())?;
    eprintln!(
        "{} {} created ({})",
        "✓".green(),
        state.id,
        state.identifier.as_deref().unwrap_or("-")
    );
    print_state(&state)
}

async fn run_read(provider: &HuaweiCloudProvider, resource_type: &str, identifier: &str) -> Result<(), String> {
    let id = ResourceId::new(resource_type, "this");
    let state = provider
        .read(&id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        eprintln!("{} {} not found", "!".yellow().bold(), identifier);
    }
    print_state(&state)
}

async fn run_update(
    provider: &HuaweiCloudProvider,
    resource_type: &str,
    identifier: &str,
    file: &Path,
) -> Result<(), String> {
    let document = load_document(file)?;
    if document.resource_type != resource_type {
        return Err(format!(
            "Document describes {}, not {}",
            document.resource_type, resource_type
        ));
    }
    let resource = document.into_resource(false);

    let current = provider
        .read(&resource.id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !current.exists {
        return Err(format!("{} {} does not exist", resource_type, identifier));
    }

    eprintln!("{} {}", "~".yellow().bold(), resource.id);
    let state = provider
        .update(&resource.id, identifier, &current, &resource)
        .await
        .map_err(|e| e.to_string())?;
    eprintln!("{} {} updated", "✓".green(), state.id);
    print_state(&state)
}

async fn run_delete(
    provider: &HuaweiCloudProvider,
    resource_type: &str,
    identifier: &str,
    file: Option<&Path>,
    auto_approve: bool,
) -> Result<(), String> {
    let current = match file {
        Some(file) => {
            let resource = load_document(file)?.into_resource(false);
            State::existing(resource.id, resource.attributes).with_identifier(identifier)
        }
        None => {
            let id = ResourceId::new(resource_type, "this");
            let state = provider
                .read(&id, Some(identifier))
                .await
                .map_err(|e| e.to_string())?;
            if !state.exists {
                println!("{}", "Nothing to delete.".green());
                return Ok(());
            }
            state
        }
    };

    if !auto_approve {
        println!(
            "{}",
            format!("Do you really want to delete {} {}?", resource_type, identifier)
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Delete cancelled.".yellow());
            return Ok(());
        }
    }

    eprintln!("{} {}", "-".red().bold(), current.id);
    provider
        .delete(&current.id, identifier, &current)
        .await
        .map_err(|e| e.to_string())?;
    eprintln!("{} {} deleted", "✓".green(), identifier);
    Ok(())
}

async fn run_import(provider: &HuaweiCloudProvider, resource_type: &str, import_id: &str) -> Result<(), String> {
    let id = ResourceId::new(resource_type, "this");
    let state = provider
        .import(&id, import_id)
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!("{} {} not found", resource_type, import_id));
    }
    eprintln!("{} {} imported", "✓".green(), import_id);
    print_state(&state)
}

async fn run_query(provider: &HuaweiCloudProvider, file: &Path) -> Result<(), String> {
    let resource = load_document(file)?.into_resource(true);
    let state = provider
        .read_data_source(&resource)
        .await
        .map_err(|e| e.to_string())?;
    print_state(&state)
}
