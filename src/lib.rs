//! # Prototype Splitter Library
//!
//! Tools for AI-generated single-page HTML prototypes: page-graph
//! extraction, Mermaid flowcharts, splitting one combined document into
//! standalone per-page files, generation through an OpenAI-compatible
//! backend, and project bookkeeping and export.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use prototype_splitter::{ContentFetcher, DiagramRenderer, PageGraphExtractor, SpaSplitter};
//! use prototype_splitter::types::{ModeSelection, SplitConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Fetch a generated project
//!     let (content, metadata) = ContentFetcher::fetch_content("projects/demo").await?;
//!
//!     // Page graph and flowchart
//!     let graph = PageGraphExtractor::default().extract(&content);
//!     println!("{}", DiagramRenderer::default().render(&graph));
//!
//!     // One standalone file per page or route
//!     let config = SplitConfig {
//!         output_dir: PathBuf::from("./output/demo"),
//!         asset_root: metadata.asset_root.clone(),
//!         markup_file: metadata.filename.clone(),
//!         mode: ModeSelection::Auto,
//!         states: Vec::new(),
//!         force: true,
//!         include_metadata: true,
//!     };
//!     let result = SpaSplitter::default().split(&content, &config, "projects/demo").await?;
//!
//!     println!("Created {} files", result.output_files.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod services;
pub mod types;

// Re-export main types and services for easier usage
pub use error::{PrototypeError, Result};
pub use services::{
    ChatClient, ContentFetcher, DiagramRenderer, ExportPackager, GenerationBackend,
    GenerationTasks, Orchestrator, PageGraphExtractor, ProjectRepository, PromptBuilder,
    RouteTableParser, SpaSplitter,
};
pub use types::{
    FlowchartReport, PageGraph, SourceMetadata, SourceType, SplitConfig, SplitMode, SplitResult,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModeSelection, TransitionKind};
    use tempfile::TempDir;

    const PROTOTYPE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Study App</title></head>
<body>
<div id="app">
  <div v-if="currentPage === 'home'">
    <button @click="currentPage = 'scan'">Scan</button>
  </div>
  <div v-if="currentPage === 'scan'">
    <button @click="currentPage = 'result'">Done</button>
  </div>
  <div v-if="currentPage === 'result'">
    <button @click="currentPage = 'home'">Home</button>
  </div>
</div>
<script>
  const { createApp, ref } = Vue;
  createApp({
    setup() {
      const currentPage = ref('home');
      const showShareModal = ref(false);
      return { currentPage, showShareModal };
    }
  }).mount('#app');
</script>
</body>
</html>"#;

    #[tokio::test]
    async fn test_basic_workflow() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("demo");
        std::fs::create_dir_all(project.join("images")).unwrap();
        std::fs::write(project.join("index.html"), PROTOTYPE).unwrap();
        std::fs::write(project.join("images").join("logo.png"), [0u8]).unwrap();

        let source = project.to_string_lossy().to_string();
        let (content, metadata) = ContentFetcher::fetch_content(&source).await.unwrap();
        assert_eq!(metadata.source_type, SourceType::ProjectDir);

        let graph = PageGraphExtractor::default().extract(&content);
        assert_eq!(graph.pages.len(), 3);
        assert!(graph
            .transitions
            .iter()
            .all(|t| t.kind == TransitionKind::Direct));

        let report = DiagramRenderer::default().report(&graph);
        assert!(report.mermaid.starts_with("flowchart TD"));
        assert_eq!(report.stats.transition_count, 3);

        let config = SplitConfig {
            output_dir: temp.path().join("out"),
            asset_root: metadata.asset_root.clone(),
            markup_file: metadata.filename.clone(),
            mode: ModeSelection::Auto,
            states: Vec::new(),
            force: false,
            include_metadata: true,
        };
        let result = SpaSplitter::default()
            .split(&content, &config, &source)
            .await
            .unwrap();

        assert_eq!(result.mode, SplitMode::Legacy);
        assert_eq!(result.output_files.len(), 3);
        for page in ["home", "scan", "result"] {
            assert!(config.output_dir.join(format!("{}.html", page)).exists());
        }
        assert!(config.output_dir.join("images").join("logo.png").exists());
        assert!(result.metadata_file.is_some());
    }

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
