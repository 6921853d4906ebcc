use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Page graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

/// How a transition was discovered in the markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// `currentPage = 'x'` inside a page block
    Direct,
    /// click handler named `goToX` / `goX`
    Method,
    /// `navigateTo('x')`
    Navigate,
    /// home -> isolated page, synthesized for diagram completeness
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: TransitionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalComponent {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGraph {
    pub pages: BTreeSet<String>,
    pub transitions: Vec<Transition>,
    pub modals: Vec<ModalComponent>,
}

impl PageGraph {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.transitions.is_empty() && self.modals.is_empty()
    }

    pub fn has_page(&self, name: &str) -> bool {
        self.pages.contains(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartStats {
    pub page_count: usize,
    pub transition_count: usize,
    pub modal_count: usize,
}

/// Everything the analyzer reports about one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowchartReport {
    pub pages: Vec<Page>,
    pub transitions: Vec<Transition>,
    pub modals: Vec<ModalComponent>,
    pub mermaid: String,
    pub stats: FlowchartStats,
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub path: String,
    pub component: String,
    /// Output file stem, without the `.html` extension.
    pub filename: String,
}

/// An overlay state forced on top of a base page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_page: String,
    pub set_true: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Legacy,
    Router,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Legacy => write!(f, "legacy"),
            SplitMode::Router => write!(f, "router"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSelection {
    #[default]
    Auto,
    Legacy,
    Router,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentKind {
    Page { page: String },
    Route { path: String, component: String },
    State { base: String, description: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedDocument {
    /// File name including the `.html` extension.
    pub filename: String,
    pub kind: DocumentKind,
    pub content: String,
}

/// Result of processing one page, route or state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum UnitOutcome {
    Produced { unit: String, filename: String },
    Skipped { unit: String, reason: String },
}

impl UnitOutcome {
    pub fn is_produced(&self) -> bool {
        matches!(self, UnitOutcome::Produced { .. })
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Produced { unit, filename } => write!(f, "✓ {} ({})", filename, unit),
            UnitOutcome::Skipped { unit, reason } => write!(f, "✗ {} skipped: {}", unit, reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub mode: SplitMode,
    pub documents: Vec<DerivedDocument>,
    pub outcomes: Vec<UnitOutcome>,
}

impl SplitPlan {
    pub fn document(&self, filename: &str) -> Option<&DerivedDocument> {
        self.documents.iter().find(|d| d.filename == filename)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_produced())
    }
}

#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub output_dir: PathBuf,
    /// Directory whose non-markup entries are copied next to the outputs.
    pub asset_root: Option<PathBuf>,
    /// Name of the combined markup file inside `asset_root`.
    pub markup_file: String,
    pub mode: ModeSelection,
    pub states: Vec<StateDefinition>,
    pub force: bool,
    pub include_metadata: bool,
}

#[derive(Debug, Clone)]
pub struct SplitResult {
    pub mode: SplitMode,
    pub output_files: Vec<PathBuf>,
    pub copied_assets: Vec<PathBuf>,
    pub outcomes: Vec<UnitOutcome>,
    pub metadata_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub filename: String,
    pub source_type: SourceType,
    pub created_at: String,
    pub total_lines: usize,
    /// Directory holding the markup's sibling assets, for local sources.
    pub asset_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    ProjectDir,
    LocalFile,
    Url,
}

// ---------------------------------------------------------------------------
// Projects and generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub background_mode: Option<String>,
    #[serde(default)]
    pub component_style: Option<String>,
}

/// One page as described by the user before generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDescription {
    pub name: String,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub interaction: String,
    #[serde(default = "default_similarity")]
    pub similarity: String,
    /// Reference image file names inside the project's `reference/` folder.
    #[serde(default)]
    pub images: Vec<String>,
    /// Number of uploaded images that belong to this page.
    #[serde(default, skip_serializing)]
    pub image_count: usize,
}

fn default_similarity() -> String {
    "layout".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Generating,
    Completed,
    Failed,
    PendingExternal,
}

/// Contents of a project's `record.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default)]
    pub global: GlobalSettings,
    #[serde(default)]
    pub pages: Vec<PageDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied_from: Option<String>,
}

/// A row of `data/projects.json` or `data/deleted_projects.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    pub url: String,
    pub date: String,
    #[serde(
        rename = "deletedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: GenerationStatus,
    pub progress: u8,
    #[serde(default)]
    pub error: String,
}

impl TaskSnapshot {
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            GenerationStatus::Completed | GenerationStatus::Failed
        )
    }
}

/// Input of one generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub project_name: String,
    /// Explicit prompt; built from `record` when absent.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub record: ProjectRecord,
    /// Reference images as `data:` URIs, in page order.
    #[serde(default)]
    pub images: Vec<String>,
    /// Download remote `<img>` sources into the project folder.
    #[serde(default = "default_true")]
    pub localize_images: bool,
}

fn default_true() -> bool {
    true
}

/// An element picked in the rendered prototype for a targeted edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSelection {
    #[serde(default)]
    pub selector: String,
    /// Outer HTML of the element as rendered.
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Navigation sidebar, PRD notes and flow diagram around the prototype.
    Viewer,
    /// The prototype alone; needs network access for CDN assets.
    Preview,
    /// One self-contained file with the prototype embedded as a blob.
    Embedded,
}
