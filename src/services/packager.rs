use crate::error::{PrototypeError, Result};
use crate::services::diagram::DiagramRenderer;
use crate::services::extractor::PageGraphExtractor;
use crate::services::markup::{
    embed_images_base64, escape_html, inject_navigation_listener, insert_after_head,
    json_for_script,
};
use crate::services::repository::{
    load_prd_dir, IMAGES_DIR, MARKUP_FILE, PRD_DIR, PROJECTS_DIR, PROMPT_FILE, RECORD_FILE,
    REFERENCE_DIR,
};
use crate::types::ExportMode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use fs_extra::dir::CopyOptions;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub const EXPORTS_DIR: &str = "exports";
const USER_IMAGES_DIR: &str = "userimages";
const PROTOTYPE_DIR: &str = "prototype";
const README_FILE: &str = "README.md";
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const VIEWER_TEMPLATE: &str = include_str!("templates/viewer.html");
const EMBEDDED_TEMPLATE: &str = include_str!("templates/embedded.html");

const OFFLINE_NOTICE: &str = r#"<!-- preview export: external CSS/JS is loaded from CDNs -->
<noscript>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; padding: 20px; }
        .offline-notice { background: #fef3cd; color: #856404; padding: 15px; border-radius: 8px; margin-bottom: 20px; }
    </style>
    <div class="offline-notice">Enable JavaScript to view this prototype.</div>
</noscript>"#;

/// Packages a project for sharing.
pub struct ExportPackager {
    projects_dir: PathBuf,
    exports_dir: PathBuf,
    extractor: PageGraphExtractor,
    renderer: DiagramRenderer,
}

impl ExportPackager {
    pub fn new(projects_dir: &Path, exports_dir: &Path) -> Self {
        Self {
            projects_dir: projects_dir.to_path_buf(),
            exports_dir: exports_dir.to_path_buf(),
            extractor: PageGraphExtractor::default(),
            renderer: DiagramRenderer::default(),
        }
    }

    pub fn for_workspace(root: &Path) -> Self {
        Self::new(&root.join(PROJECTS_DIR), &root.join(EXPORTS_DIR))
    }

    /// Writes the export and returns its directory.
    pub async fn export(&self, id: &str, mode: ExportMode) -> Result<PathBuf> {
        let project_dir = self.projects_dir.join(id);
        let markup_path = project_dir.join(MARKUP_FILE);
        if id.is_empty() || id.contains(['/', '\\']) || !project_dir.is_dir() {
            return Err(PrototypeError::ProjectNotFound { id: id.to_string() });
        }
        if !markup_path.is_file() {
            return Err(PrototypeError::FileNotFound {
                path: markup_path.display().to_string(),
            });
        }

        let export_dir = self.exports_dir.join(export_dir_name(id, mode));
        if export_dir.exists() {
            fs::remove_dir_all(&export_dir).await?;
        }
        fs::create_dir_all(&export_dir).await?;

        info!("Exporting {} ({:?}) to {}", id, mode, export_dir.display());
        match mode {
            ExportMode::Viewer => self.export_viewer(id, &project_dir, &export_dir).await?,
            ExportMode::Preview => export_preview(id, &project_dir, &export_dir).await?,
            ExportMode::Embedded => export_embedded(id, &project_dir, &export_dir).await?,
        }

        info!("Export written to {}", export_dir.display());
        Ok(export_dir)
    }

    async fn export_viewer(&self, id: &str, project_dir: &Path, export_dir: &Path) -> Result<()> {
        let prototype_dir = export_dir.join(PROTOTYPE_DIR);
        fs::create_dir_all(&prototype_dir).await?;
        copy_project_entries(project_dir, &prototype_dir, &[PRD_DIR]).await?;

        let markup = fs::read_to_string(project_dir.join(MARKUP_FILE)).await?;
        let prepared = inject_navigation_listener(&markup, self.extractor.state_var())?;
        fs::write(prototype_dir.join(MARKUP_FILE), prepared).await?;

        let graph = self.extractor.extract(&markup);
        let report = self.renderer.report(&graph);
        let prd_notes = load_prd_dir(&project_dir.join(PRD_DIR)).await?;
        debug!(
            "{} pages, {} transitions, {} modals, {} PRD notes",
            report.stats.page_count,
            report.stats.transition_count,
            report.stats.modal_count,
            prd_notes.len()
        );

        let name = display_name(id);
        let viewer = VIEWER_TEMPLATE
            .replace("__PROJECT_NAME__", &escape_html(name))
            .replace("__PAGES_JSON__", &json_for_script(&report.pages)?)
            .replace("__PRD_JSON__", &json_for_script(&prd_notes)?)
            .replace("__TRANSITIONS_JSON__", &json_for_script(&report.transitions)?)
            .replace("__MODALS_JSON__", &json_for_script(&report.modals)?)
            .replace("__MERMAID__", &json_for_script(&report.mermaid)?);
        fs::write(export_dir.join(MARKUP_FILE), viewer).await?;

        let readme = format!(
            "# {} - Prototype viewer\n\n\
             ## Usage\n\n\
             Open `index.html` in a browser. No server is needed.\n\n\
             - **Left**: page list, click to switch pages\n\
             - **Center**: the prototype, with mobile and web frames\n\
             - **Right**: PRD notes for the current page\n\
             - **Page flow**: transition diagram between pages\n\n\
             ## Files\n\n\
             - `index.html`: the viewer\n\
             - `prototype/`: the prototype and its assets\n\n\
             ---\n\
             Exported: {}\n",
            name,
            export_timestamp()
        );
        fs::write(export_dir.join(README_FILE), readme).await?;
        Ok(())
    }
}

async fn export_preview(id: &str, project_dir: &Path, export_dir: &Path) -> Result<()> {
    copy_project_entries(
        project_dir,
        export_dir,
        &[MARKUP_FILE, PRD_DIR, RECORD_FILE, PROMPT_FILE, REFERENCE_DIR],
    )
    .await?;

    let markup = fs::read_to_string(project_dir.join(MARKUP_FILE)).await?;
    fs::write(
        export_dir.join(MARKUP_FILE),
        insert_after_head(&markup, OFFLINE_NOTICE),
    )
    .await?;

    let readme = format!(
        "# {} - Prototype preview\n\n\
         ## Usage\n\n\
         Open `index.html` in a browser.\n\n\
         > This copy loads CSS and JS libraries from the network. Ask for the\n\
         > viewer export if you need to browse it offline.\n\n\
         The prototype is interactive: buttons and links switch pages. It looks\n\
         best on a phone or in the browser's device emulation.\n\n\
         ---\n\
         Exported: {}\n\
         Mode: preview\n",
        display_name(id),
        export_timestamp()
    );
    fs::write(export_dir.join(README_FILE), readme).await?;
    Ok(())
}

async fn export_embedded(id: &str, project_dir: &Path, export_dir: &Path) -> Result<()> {
    let markup = fs::read_to_string(project_dir.join(MARKUP_FILE)).await?;
    let markup = embed_images_base64(&markup, &project_dir.join(IMAGES_DIR), IMAGES_DIR)?;
    let markup = embed_images_base64(&markup, &project_dir.join(USER_IMAGES_DIR), USER_IMAGES_DIR)?;

    let name = display_name(id);
    let page = EMBEDDED_TEMPLATE
        .replace("__DISPLAY_NAME__", &escape_html(name))
        .replace("__PROTOTYPE_B64__", &STANDARD.encode(markup.as_bytes()));
    let filename = embedded_filename(id);
    fs::write(export_dir.join(&filename), page).await?;

    let readme = format!(
        "# {} - Embedded prototype\n\n\
         ## Usage\n\n\
         Open `{}` in a browser. The file is self-contained and can be shared as is.\n\n\
         The gear icon in the top right switches the view:\n\
         - **Auto**: detect the prototype type\n\
         - **Web**: full-width page\n\
         - **App**: phone frame\n\n\
         > CSS and JS libraries are still loaded from the network.\n\n\
         ---\n\
         Exported: {}\n",
        name,
        filename,
        export_timestamp()
    );
    fs::write(export_dir.join(README_FILE), readme).await?;
    Ok(())
}

/// Copies the top-level entries of `from` into `to`, skipping `excluded`.
async fn copy_project_entries(from: &Path, to: &Path, excluded: &[&str]) -> Result<()> {
    let mut entries = fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if excluded.contains(&name.as_str()) {
            continue;
        }

        let source = entry.path();
        if entry.file_type().await?.is_dir() {
            let options = CopyOptions::new().overwrite(true);
            fs_extra::dir::copy(&source, to, &options)?;
            debug!("Copied directory {}/", name);
        } else {
            fs::copy(&source, to.join(&name)).await?;
        }
    }
    Ok(())
}

fn export_dir_name(id: &str, mode: ExportMode) -> String {
    match mode {
        ExportMode::Viewer => id.to_string(),
        ExportMode::Preview => format!("{}_preview", id),
        ExportMode::Embedded => format!("{}_embedded", id),
    }
}

/// Name shown in exports: the project id up to its first underscore.
pub fn display_name(id: &str) -> &str {
    id.split('_').next().unwrap_or(id)
}

pub fn embedded_filename(id: &str) -> String {
    format!("{}_embedded.html", display_name(id))
}

fn export_timestamp() -> String {
    Local::now().format(EXPORT_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT_ID: &str = "StudyApp_20200101_9-05-00am";
    const PROTOTYPE: &str = r#"<!DOCTYPE html>
<html><head><title>Study App</title></head><body>
<img src="images/logo.png">
<script>
  createApp({
    setup() {
      const currentPage = ref('home');
      const showShareModal = ref(false);
      return { currentPage, showShareModal };
    }
  }).mount('#app');
</script>
<div v-if="currentPage === 'home'"><button @click="currentPage = 'scan'">Scan</button></div>
<div v-if="currentPage === 'scan'"></div>
</body></html>"#;

    fn setup_project(temp: &TempDir) -> ExportPackager {
        let project = temp.path().join(PROJECTS_DIR).join(PROJECT_ID);
        std::fs::create_dir_all(project.join(IMAGES_DIR)).unwrap();
        std::fs::create_dir_all(project.join(PRD_DIR)).unwrap();
        std::fs::create_dir_all(project.join(REFERENCE_DIR)).unwrap();
        std::fs::write(project.join(MARKUP_FILE), PROTOTYPE).unwrap();
        std::fs::write(project.join(RECORD_FILE), "{}").unwrap();
        std::fs::write(project.join(PROMPT_FILE), "prompt").unwrap();
        std::fs::write(project.join(IMAGES_DIR).join("logo.png"), [1u8, 2, 3]).unwrap();
        std::fs::write(project.join(PRD_DIR).join("home.md"), "# Home\n</script>").unwrap();
        std::fs::write(project.join(REFERENCE_DIR).join("ref_1.png"), [0u8]).unwrap();
        ExportPackager::for_workspace(temp.path())
    }

    #[test]
    fn test_names() {
        assert_eq!(display_name(PROJECT_ID), "StudyApp");
        assert_eq!(display_name("plain"), "plain");
        assert_eq!(embedded_filename(PROJECT_ID), "StudyApp_embedded.html");
        assert_eq!(export_dir_name("a_b", ExportMode::Preview), "a_b_preview");
    }

    #[tokio::test]
    async fn test_viewer_export() {
        let temp = TempDir::new().unwrap();
        let packager = setup_project(&temp);

        let dir = packager.export(PROJECT_ID, ExportMode::Viewer).await.unwrap();
        assert_eq!(dir, temp.path().join(EXPORTS_DIR).join(PROJECT_ID));

        let prototype = dir.join(PROTOTYPE_DIR);
        assert!(prototype.join(IMAGES_DIR).join("logo.png").exists());
        assert!(prototype.join(RECORD_FILE).exists());
        assert!(!prototype.join(PRD_DIR).exists());
        let prepared = std::fs::read_to_string(prototype.join(MARKUP_FILE)).unwrap();
        assert!(prepared.contains("window.currentPage = currentPage;"));

        let viewer = std::fs::read_to_string(dir.join(MARKUP_FILE)).unwrap();
        assert!(viewer.contains("<title>StudyApp - Prototype Viewer</title>"));
        assert!(viewer.contains(r#""name":"scan""#));
        assert!(viewer.contains(r##""home":"# Home\n<\/script>""##));
        assert!(viewer.contains(r#""from":"home","to":"scan""#));
        assert!(viewer.contains("flowchart TD"));
        assert!(!viewer.contains("__PAGES_JSON__"));
        assert!(dir.join(README_FILE).exists());
    }

    #[tokio::test]
    async fn test_preview_export() {
        let temp = TempDir::new().unwrap();
        let packager = setup_project(&temp);

        let dir = packager.export(PROJECT_ID, ExportMode::Preview).await.unwrap();
        assert!(dir.ends_with(format!("{}_preview", PROJECT_ID)));
        assert!(dir.join(IMAGES_DIR).join("logo.png").exists());
        for skipped in [PRD_DIR, RECORD_FILE, PROMPT_FILE, REFERENCE_DIR] {
            assert!(!dir.join(skipped).exists(), "{} should be skipped", skipped);
        }

        let html = std::fs::read_to_string(dir.join(MARKUP_FILE)).unwrap();
        assert!(html.contains("<head>\n<!-- preview export"));
        assert!(html.contains("<noscript>"));
        assert!(dir.join(README_FILE).exists());
    }

    #[tokio::test]
    async fn test_embedded_export() {
        let temp = TempDir::new().unwrap();
        let packager = setup_project(&temp);

        let dir = packager.export(PROJECT_ID, ExportMode::Embedded).await.unwrap();
        let page = std::fs::read_to_string(dir.join("StudyApp_embedded.html")).unwrap();
        assert!(page.contains("<title>StudyApp - Prototype</title>"));

        let start = page.find("const prototypeB64 = \"").unwrap() + "const prototypeB64 = \"".len();
        let end = start + page[start..].find('"').unwrap();
        let decoded = String::from_utf8(STANDARD.decode(&page[start..end]).unwrap()).unwrap();
        assert!(decoded.contains(r#"<img src="data:image/png;base64,AQID">"#));
        assert!(!decoded.contains("images/logo.png"));
        assert!(dir.join(README_FILE).exists());
    }

    #[tokio::test]
    async fn test_export_replaces_previous_output() {
        let temp = TempDir::new().unwrap();
        let packager = setup_project(&temp);

        let dir = packager.export(PROJECT_ID, ExportMode::Preview).await.unwrap();
        std::fs::write(dir.join("stale.txt"), "old").unwrap();
        packager.export(PROJECT_ID, ExportMode::Preview).await.unwrap();
        assert!(!dir.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_project() {
        let temp = TempDir::new().unwrap();
        let packager = setup_project(&temp);
        assert!(matches!(
            packager.export("nope", ExportMode::Viewer).await,
            Err(PrototypeError::ProjectNotFound { .. })
        ));
        assert!(matches!(
            packager.export("../projects", ExportMode::Viewer).await,
            Err(PrototypeError::ProjectNotFound { .. })
        ));
    }
}
