mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{
    AnalyzeArgs, Cli, Commands, ExportArgs, FlowchartArgs, GenerateArgs, ModelsCommand,
    ProjectsCommand, RefineArgs, SplitArgs, ValidateArgs,
};
use prototype_splitter::config::{AppConfig, ModelProfile, ModelRegistry};
use prototype_splitter::services::generator::{create_placeholder, refine_elements};
use prototype_splitter::services::splitter::load_states;
use prototype_splitter::types::{
    ElementSelection, GenerationRequest, GenerationStatus, ProjectEntry, SourceMetadata,
    SourceType, SplitConfig,
};
use prototype_splitter::{
    ChatClient, ContentFetcher, DiagramRenderer, ExportPackager, Orchestrator, PageGraphExtractor,
    ProjectRepository, PrototypeError, Result, SpaSplitter,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const STATES_FILE: &str = "states.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Split(args) => handle_split_command(args, &cli.output).await,
        Commands::Analyze(args) => handle_analyze_command(args).await,
        Commands::Flowchart(args) => handle_flowchart_command(args).await,
        Commands::Validate(args) => handle_validate_command(args).await,
        Commands::Generate(args) => handle_generate_command(args, &cli.workspace).await,
        Commands::Refine(args) => handle_refine_command(args, &cli.workspace).await,
        Commands::Projects(command) => handle_projects_command(command, &cli.workspace).await,
        Commands::Models(command) => handle_models_command(command, &cli.workspace).await,
        Commands::Export(args) => handle_export_command(args, &cli.workspace).await,
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn handle_split_command(args: &SplitArgs, output_dir: &Path) -> Result<()> {
    ContentFetcher::validate_sources(&[args.source.clone()]).await?;
    let (content, metadata) = ContentFetcher::fetch_content(&args.source).await?;

    let states_path = args.states.clone().or_else(|| {
        metadata
            .asset_root
            .as_ref()
            .filter(|_| metadata.source_type == SourceType::ProjectDir)
            .map(|root| root.join(STATES_FILE))
            .filter(|path| path.is_file())
    });
    let states = match &states_path {
        Some(path) => {
            info!("Using state definitions from {}", path.display());
            load_states(path).await?
        }
        None => Vec::new(),
    };

    let config = SplitConfig {
        output_dir: output_dir.join(output_name(&args.source, &metadata)),
        asset_root: metadata.asset_root.clone(),
        markup_file: metadata.filename.clone(),
        mode: args.mode.into(),
        states,
        force: args.force,
        include_metadata: args.include_metadata,
    };

    let splitter = SpaSplitter::default();
    let plan = splitter.plan(&content, config.mode, &config.states)?;
    info!(
        "'{}' is a {} app, {} documents planned",
        args.source,
        plan.mode,
        plan.documents.len()
    );

    let result = SpaSplitter::write_plan(&plan, &config, &args.source).await?;

    for output_file in &result.output_files {
        info!("  - {}", output_file.display());
    }
    if let Some(metadata_file) = &result.metadata_file {
        info!("  - {} (metadata)", metadata_file.display());
    }

    info!(
        "Split completed: {} files in {}",
        result.output_files.len(),
        config.output_dir.display()
    );
    Ok(())
}

/// Folder name for a split: the project directory or the file stem.
fn output_name(source: &str, metadata: &SourceMetadata) -> String {
    let name = match metadata.source_type {
        SourceType::ProjectDir => Path::new(source)
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string())),
        SourceType::LocalFile | SourceType::Url => Path::new(&metadata.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string()),
    };
    name.filter(|n| !n.is_empty())
        .unwrap_or_else(|| "prototype".to_string())
}

async fn handle_analyze_command(args: &AnalyzeArgs) -> Result<()> {
    info!("Starting analysis of {} sources", args.sources.len());

    let validated_sources = ContentFetcher::validate_sources(&args.sources).await?;
    let extractor = PageGraphExtractor::default();
    let renderer = DiagramRenderer::default();
    let splitter = SpaSplitter::default();

    let mut all_analyses = BTreeMap::new();

    for (source, (content, metadata)) in validated_sources
        .iter()
        .zip(ContentFetcher::fetch_multiple(&validated_sources).await?)
    {
        let graph = extractor.extract(&content);
        let report = renderer.report(&graph);
        let mode = splitter.detect_mode(&content);

        println!("\n=== Analysis for '{}' ===", source);
        println!("Source type: {:?}", metadata.source_type);
        println!("Total lines: {}", metadata.total_lines);
        println!("Detected mode: {}", mode);
        println!("Pages: {}", report.stats.page_count);
        for page in &report.pages {
            println!("  - {} ({})", page.name, page.label);
        }
        println!("Transitions: {}", report.stats.transition_count);
        println!("Modals: {}", report.stats.modal_count);

        if args.detailed {
            println!("\nTransitions:");
            for transition in &report.transitions {
                println!(
                    "  {} -> {} [{:?}]",
                    transition.from, transition.to, transition.kind
                );
            }
            if !report.modals.is_empty() {
                println!("\nModals:");
                for modal in &report.modals {
                    println!("  - {} ({})", modal.name, modal.label);
                }
            }
        }

        all_analyses.insert(
            source.clone(),
            serde_json::json!({
                "metadata": metadata,
                "mode": mode,
                "flowchart": report,
            }),
        );
    }

    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&all_analyses)
            .context("Failed to serialize analysis results")?;

        tokio::fs::write(json_path, json_content)
            .await
            .context("Failed to write JSON analysis file")?;

        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}

async fn handle_flowchart_command(args: &FlowchartArgs) -> Result<()> {
    let (content, _) = ContentFetcher::fetch_content(&args.source).await?;
    let graph = PageGraphExtractor::default().extract(&content);
    if graph.pages.is_empty() {
        warn!("No pages found in '{}'", args.source);
    }
    let mermaid = DiagramRenderer::default().render(&graph);

    match &args.out {
        Some(path) => {
            tokio::fs::write(path, &mermaid)
                .await
                .context("Failed to write flowchart")?;
            info!("Flowchart written to: {}", path.display());
        }
        None => println!("{}", mermaid),
    }
    Ok(())
}

async fn handle_validate_command(args: &ValidateArgs) -> Result<()> {
    info!("Validating {} sources", args.sources.len());

    let splitter = SpaSplitter::default();
    let mut valid_sources = Vec::new();
    let mut invalid_sources = Vec::new();

    for source in &args.sources {
        match ContentFetcher::validate_sources(&[source.clone()]).await {
            Ok(_) => {
                info!("✓ Valid: {}", source);
                valid_sources.push(source);

                if args.check_access {
                    match ContentFetcher::fetch_content(source).await {
                        Ok((content, metadata)) => {
                            info!(
                                "  Accessible, {} lines, {} mode",
                                metadata.total_lines,
                                splitter.detect_mode(&content)
                            );
                        }
                        Err(e) => {
                            error!("  Cannot access content: {}", e);
                            invalid_sources.push((source, format!("Access error: {}", e)));
                        }
                    }
                }
            }
            Err(e) => {
                error!("✗ Invalid: {} - {}", source, e);
                invalid_sources.push((source, e.to_string()));
            }
        }
    }

    println!("\n=== Validation Summary ===");
    println!("Valid sources: {}/{}", valid_sources.len(), args.sources.len());

    if !invalid_sources.is_empty() {
        println!("Invalid sources:");
        let invalid_count = invalid_sources.len();
        for (source, error) in invalid_sources {
            println!("  - {}: {}", source, error);
        }
        return Err(PrototypeError::Validation {
            reason: format!("{} sources failed validation", invalid_count),
        });
    }

    println!("All sources are valid!");
    Ok(())
}

async fn handle_generate_command(args: &GenerateArgs, workspace: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.request)
        .await
        .with_context(|| format!("Failed to read {}", args.request.display()))?;
    let request: GenerationRequest = serde_json::from_str(&raw)?;

    let config = AppConfig::load(workspace).await?;
    let registry = ModelRegistry::load_or_init(workspace).await?;
    let repository = Arc::new(ProjectRepository::open(workspace).await?);
    let model_name = registry.selected().map(|m| m.display_name().to_string());

    if args.prompt_only {
        let (entry, _) = create_placeholder(&repository, &request, model_name).await?;
        info!(
            "Prompt written to {}",
            repository.project_dir(&entry.id).join("prompt.txt").display()
        );
        print_entry(&entry);
        return Ok(());
    }

    let profile = registry.selected().cloned().ok_or_else(|| PrototypeError::Config {
        reason: "no model configured in models.json".to_string(),
    })?;
    let backend = ChatClient::new(profile, config.ai_options)?;
    let orchestrator = Orchestrator::new(repository.clone(), Arc::new(backend), model_name);

    let (entry, handle) = orchestrator.submit(request).await?;
    info!("Generating {}", entry.id);

    let mut last_progress = None;
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let Some(snapshot) = orchestrator.tasks().snapshot(&entry.id).await else {
            break;
        };
        if last_progress != Some(snapshot.progress) {
            info!("  {:?} {}%", snapshot.status, snapshot.progress);
            last_progress = Some(snapshot.progress);
        }
        if snapshot.is_finished() {
            break;
        }
    }
    handle.await.context("Generation task panicked")?;

    match orchestrator.tasks().snapshot(&entry.id).await {
        Some(snapshot) if snapshot.status == GenerationStatus::Completed => {
            info!(
                "Prototype written to {}",
                repository.project_dir(&entry.id).join("index.html").display()
            );
            Ok(())
        }
        Some(snapshot) => Err(PrototypeError::Generation {
            reason: snapshot.error,
        }),
        None => Err(PrototypeError::Generation {
            reason: format!("task for {} disappeared", entry.id),
        }),
    }
}

async fn handle_refine_command(args: &RefineArgs, workspace: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.elements)
        .await
        .with_context(|| format!("Failed to read {}", args.elements.display()))?;
    let elements: Vec<ElementSelection> = serde_json::from_str(&raw)?;

    let config = AppConfig::load(workspace).await?;
    let registry = ModelRegistry::load_or_init(workspace).await?;
    let repository = ProjectRepository::open(workspace).await?;
    let profile = registry.selected().cloned().ok_or_else(|| PrototypeError::Config {
        reason: "no model configured in models.json".to_string(),
    })?;
    let backend = ChatClient::new(profile, config.ai_options)?;

    let backup = refine_elements(&repository, &backend, &args.project, &args.change, &elements).await?;
    info!("Previous version kept at {}", backup.display());
    Ok(())
}

async fn handle_projects_command(command: &ProjectsCommand, workspace: &Path) -> Result<()> {
    let repository = ProjectRepository::open(workspace).await?;

    match command {
        ProjectsCommand::List => {
            let projects = repository.list_projects().await?;
            println!("{} projects", projects.len());
            projects.iter().for_each(print_entry);
        }
        ProjectsCommand::Deleted => {
            let projects = repository.list_deleted().await?;
            println!("{} deleted projects", projects.len());
            projects.iter().for_each(print_entry);
        }
        ProjectsCommand::Rename { id, name } => {
            let entry = repository.rename(id, name).await?;
            info!("Renamed {} -> {}", id, entry.id);
        }
        ProjectsCommand::Copy { id, name } => {
            let entry = repository.copy(id, name).await?;
            info!("Copied {} -> {}", id, entry.id);
        }
        ProjectsCommand::Delete { id } => {
            repository.soft_delete(id).await?;
            info!("Moved {} to the deleted area", id);
        }
        ProjectsCommand::Restore { id } => {
            repository.restore(id).await?;
            info!("Restored {}", id);
        }
    }
    Ok(())
}

async fn handle_models_command(command: &ModelsCommand, workspace: &Path) -> Result<()> {
    let mut registry = ModelRegistry::load_or_init(workspace).await?;

    match command {
        ModelsCommand::List => {
            let selected = registry.selected().map(|m| m.id.clone());
            for model in &registry.models {
                let marker = if selected.as_deref() == Some(model.id.as_str()) { "*" } else { " " };
                let key = if model.has_api_key() { "" } else { " (no API key)" };
                println!(
                    "{} {}  {}  {} @ {}{}",
                    marker,
                    model.id,
                    model.display_name(),
                    model.model,
                    model.base_url,
                    key
                );
            }
            return Ok(());
        }
        ModelsCommand::Select { id } => {
            let model = registry.select(id)?;
            info!("Selected model: {}", model.display_name());
        }
        ModelsCommand::Save(args) => {
            let profile = ModelProfile {
                id: args.id.clone(),
                name: args.name.clone(),
                provider: args.provider.clone(),
                base_url: args.base_url.clone(),
                api_key: args.api_key.clone(),
                model: args.model.clone(),
            };
            if registry.upsert(profile)? {
                info!("Updated model {}", args.id);
            } else {
                info!("Added model {}", args.id);
            }
        }
        ModelsCommand::Delete { id } => {
            let removed = registry.remove(id)?;
            info!("Removed model {}", removed.display_name());
        }
    }

    registry.save(workspace).await
}

fn print_entry(entry: &ProjectEntry) {
    let status = entry
        .status
        .map(|s| format!(" [{:?}]", s))
        .unwrap_or_default();
    let deleted = entry
        .deleted_at
        .as_ref()
        .map(|d| format!(" (deleted {})", d))
        .unwrap_or_default();
    println!("  {}  {}  {}{}{}", entry.date, entry.id, entry.name, status, deleted);
}

async fn handle_export_command(args: &ExportArgs, workspace: &Path) -> Result<()> {
    let packager = ExportPackager::for_workspace(workspace);
    let export_dir: PathBuf = packager.export(&args.project, args.mode.into()).await?;
    info!("Export ready: {}", export_dir.display());
    Ok(())
}
