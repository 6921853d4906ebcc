pub mod diagram;
pub mod extractor;
pub mod fetcher;
pub mod generator;
pub mod markup;
pub mod packager;
pub mod repository;
pub mod routes;
pub mod splitter;

pub use diagram::DiagramRenderer;
pub use extractor::PageGraphExtractor;
pub use fetcher::ContentFetcher;
pub use generator::{ChatClient, GenerationBackend, GenerationTasks, Orchestrator, PromptBuilder};
pub use packager::ExportPackager;
pub use repository::ProjectRepository;
pub use routes::RouteTableParser;
pub use splitter::SpaSplitter;
