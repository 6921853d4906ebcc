use clap::{Args, Parser, Subcommand, ValueEnum};
use prototype_splitter::types::{ExportMode, ModeSelection};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "proto-split")]
#[command(about = "Analyze, split and package generated single-page HTML prototypes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output directory for split files
    #[arg(short, long, global = true, default_value = "./output")]
    pub output: PathBuf,

    /// Workspace holding config.json, models.json and projects/
    #[arg(short, long, global = true, default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a prototype into one standalone file per page, route or state
    Split(SplitArgs),

    /// Print the page graph of prototypes
    Analyze(AnalyzeArgs),

    /// Render the page flow as a Mermaid flowchart
    Flowchart(FlowchartArgs),

    /// Validate input sources
    Validate(ValidateArgs),

    /// Generate a new prototype project
    Generate(GenerateArgs),

    /// Rewrite selected elements of a project's prototype
    Refine(RefineArgs),

    /// Manage workspace projects
    #[command(subcommand)]
    Projects(ProjectsCommand),

    /// Manage model profiles in models.json
    #[command(subcommand)]
    Models(ModelsCommand),

    /// Package a project for sharing
    Export(ExportArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Auto,
    Legacy,
    Router,
}

impl From<ModeArg> for ModeSelection {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => ModeSelection::Auto,
            ModeArg::Legacy => ModeSelection::Legacy,
            ModeArg::Router => ModeSelection::Router,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportModeArg {
    Viewer,
    Preview,
    Embedded,
}

impl From<ExportModeArg> for ExportMode {
    fn from(mode: ExportModeArg) -> Self {
        match mode {
            ExportModeArg::Viewer => ExportMode::Viewer,
            ExportModeArg::Preview => ExportMode::Preview,
            ExportModeArg::Embedded => ExportMode::Embedded,
        }
    }
}

#[derive(Args)]
pub struct SplitArgs {
    /// Project directory, HTML file or URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Splitting strategy
    #[arg(long, value_enum, default_value = "auto")]
    pub mode: ModeArg,

    /// JSON array of state definitions
    #[arg(long, value_name = "FILE")]
    pub states: Option<PathBuf>,

    /// Force overwrite existing output files
    #[arg(long)]
    pub force: bool,

    /// Write split_manifest.json next to the documents
    #[arg(long)]
    pub include_metadata: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Project directories, HTML files or URLs
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Output analysis to JSON file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show transitions and modals
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args)]
pub struct FlowchartArgs {
    /// Project directory, HTML file or URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Write the diagram to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Project directories, HTML files or URLs
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Check if sources are accessible
    #[arg(long)]
    pub check_access: bool,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// JSON generation request
    #[arg(long, value_name = "FILE")]
    pub request: PathBuf,

    /// Only write the prompt and a placeholder project; no backend call
    #[arg(long)]
    pub prompt_only: bool,
}

#[derive(Args)]
pub struct RefineArgs {
    /// Project id
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// What to change
    #[arg(long, value_name = "TEXT")]
    pub change: String,

    /// JSON array of `{ "selector", "html" }` elements
    #[arg(long, value_name = "FILE")]
    pub elements: PathBuf,
}

#[derive(Subcommand)]
pub enum ProjectsCommand {
    /// List live projects
    List,

    /// List soft-deleted projects
    Deleted,

    /// Give a project a new display name
    Rename {
        id: String,
        name: String,
    },

    /// Duplicate a project under a new name
    Copy {
        id: String,
        name: String,
    },

    /// Move a project to the deleted area
    Delete { id: String },

    /// Bring a deleted project back
    Restore { id: String },
}

#[derive(Subcommand)]
pub enum ModelsCommand {
    /// List model profiles
    List,

    /// Use a profile for generation
    Select { id: String },

    /// Add a profile or replace the one with the same id
    Save(ModelArgs),

    /// Remove a profile
    Delete { id: String },
}

#[derive(Args)]
pub struct ModelArgs {
    /// Profile id
    #[arg(long)]
    pub id: String,

    /// Display name
    #[arg(long, default_value = "")]
    pub name: String,

    #[arg(long, default_value = "")]
    pub provider: String,

    /// OpenAI-compatible base URL, e.g. https://api.openai.com/v1
    #[arg(long)]
    pub base_url: String,

    #[arg(long)]
    pub api_key: String,

    /// Model name sent with each request
    #[arg(long)]
    pub model: String,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Project id
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Export layout
    #[arg(long, value_enum, default_value = "viewer")]
    pub mode: ExportModeArg,
}
