use crate::config::{AiOptions, ModelProfile};
use crate::error::{PrototypeError, Result};
use crate::services::extractor::{compile, DEFAULT_STATE_VAR};
use crate::services::fetcher::ContentFetcher;
use crate::services::markup::{escape_html, extension_for_mime, inject_navigation_listener};
use crate::services::repository::{
    ProjectRepository, DATE_FORMAT, IMAGES_DIR, MARKUP_FILE, PENDING_NAME_SUFFIX, REFERENCE_DIR,
};
use crate::types::{
    ElementSelection, GenerationRequest, GenerationStatus, ProjectEntry, ProjectRecord,
    ProjectStatus, TaskSnapshot,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const FALLBACK_EXCERPT_CHARS: usize = 5000;
const MIN_REFINED_CHARS: usize = 100;

pub const BACKUP_FILE: &str = "index.html.bak";

pub struct PromptBuilder;

impl PromptBuilder {
    /// Renders the page descriptions of a record into a generation prompt.
    pub fn build(project_name: &str, record: &ProjectRecord) -> String {
        let global = &record.global;
        let setting = |value: &Option<String>, default: &str| {
            value.clone().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
        };
        let background = match global.background_mode.as_deref() {
            Some("dark") => "dark",
            _ => "light",
        };

        let mut prompt = format!(
            "You are a professional front-end engineer and UI/UX designer.\n\
             Generate a high-fidelity HTML prototype for \"{}\".\n\n\
             # Tech stack\n\
             - Tailwind CSS (CDN)\n\
             - Vue 3 (CDN, optional)\n\
             - FontAwesome (CDN)\n\
             - ECharts (for charts)\n\
             - Google Fonts (Inter)\n\n\
             # Global design\n\
             - Primary color: {}\n\
             - Accent color: {}\n\
             - Background: {}\n\
             - Component style: {}\n\
             - Border radius: 0.5rem\n\
             - Shadows: soft and modern\n\n\
             # Pages\n",
            project_name,
            setting(&global.primary_color, "#3b82f6"),
            setting(&global.secondary_color, "#10b981"),
            background,
            setting(&global.component_style, "modern"),
        );

        for (index, page) in record.pages.iter().enumerate() {
            let name = if page.name.is_empty() {
                format!("Page {}", index + 1)
            } else {
                page.name.clone()
            };
            prompt.push_str(&format!("\n## Page {}: {}\n", index + 1, name));

            if !page.layout.is_empty() {
                prompt.push_str(&format!("**Layout**: {}\n", page.layout));
            }
            if !page.features.is_empty() {
                prompt.push_str(&format!("**Features**: {}\n", page.features));
            }
            if !page.interaction.is_empty() {
                prompt.push_str(&format!("**Interaction**: {}\n", page.interaction));
            }

            let image_count = page.image_count.max(page.images.len());
            if image_count > 0 {
                let guidance = match page.similarity.as_str() {
                    "pixel" => "Reproduce them as closely as possible, pixel for pixel.",
                    "style" => "Follow their visual style.",
                    _ => "Follow their layout structure.",
                };
                prompt.push_str(&format!(
                    "**Reference images**: {} attached. {}\n",
                    image_count, guidance
                ));
            }
        }

        prompt.push_str(
            "\n# Output (important)\n\n\
             Return one complete, standalone HTML file:\n\
             1. All CSS inside <style> tags\n\
             2. All JS inside <script> tags\n\
             3. Realistic sample data, no Lorem ipsum\n\
             4. Responsive layout\n\
             5. Opens directly in a browser\n\n\
             Format:\n\
             ```html\n\
             <!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             ...\n\
             </html>\n\
             ```\n",
        );

        prompt
    }

    /// Prompt for editing only the selected elements of an existing page.
    pub fn refinement(current_html: &str, elements: &[ElementSelection], request: &str) -> String {
        let mut prompt = format!(
            "You are an HTML editing specialist. Apply the requested change to the \
             selected elements only.\n\n\
             ## Current document\n```html\n{}\n```\n\n\
             ## Selected elements\n",
            current_html
        );
        for (index, element) in elements.iter().enumerate() {
            let selector = if element.selector.is_empty() {
                "unknown"
            } else {
                &element.selector
            };
            prompt.push_str(&format!(
                "Element {}:\n- Selector: {}\n- HTML:\n```html\n{}\n```\n",
                index + 1,
                selector,
                element.html
            ));
        }
        prompt.push_str(&format!(
            "\n## Requested change\n{}\n\n\
             ## Rules\n\
             1. Change only the elements listed above\n\
             2. Keep the overall style and structure of the page\n\
             3. Prefer inline styles or Tailwind classes for visual changes\n\
             4. Return the complete modified document\n\n\
             Reply with the full HTML, from <!DOCTYPE html> to </html>, and nothing else.\n",
            request.trim()
        ));
        prompt
    }
}

/// Produces raw model output for a prompt and its reference images.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, prompt: &str, images: &[String]) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct ChatClient {
    client: reqwest::Client,
    profile: ModelProfile,
    options: AiOptions,
}

impl ChatClient {
    pub fn new(profile: ModelProfile, options: AiOptions) -> Result<Self> {
        if !profile.has_api_key() {
            return Err(PrototypeError::Config {
                reason: format!("model '{}' has no API key", profile.display_name()),
            });
        }
        if profile.base_url.is_empty() {
            return Err(PrototypeError::Config {
                reason: format!("model '{}' has no base_url", profile.display_name()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout))
            .build()?;

        Ok(Self {
            client,
            profile,
            options,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.profile.base_url.trim_end_matches('/'))
    }

    fn payload(&self, prompt: &str, images: &[String]) -> serde_json::Value {
        let mut user_content = vec![json!({ "type": "text", "text": prompt })];
        for image in images {
            user_content.push(json!({ "type": "image_url", "image_url": { "url": image } }));
        }

        json!({
            "model": self.profile.model,
            "messages": [
                { "role": "system", "content": self.options.system_prompt },
                { "role": "user", "content": user_content }
            ],
            "max_tokens": self.options.max_tokens,
            "temperature": self.options.temperature
        })
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.profile.api_key)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PrototypeError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json::<ChatResponse>().await?)
    }
}

#[async_trait]
impl GenerationBackend for ChatClient {
    async fn complete(&self, prompt: &str, images: &[String]) -> Result<String> {
        let payload = self.payload(prompt, images);
        let attempts = self.options.max_retries.max(1);
        info!(
            "Calling {} ({}), timeout {}s",
            self.profile.display_name(),
            self.profile.model,
            self.options.timeout
        );

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.send(&payload).await {
                Ok(response) => {
                    let choice = response.choices.into_iter().next().ok_or_else(|| {
                        PrototypeError::Generation {
                            reason: "response contained no choices".to_string(),
                        }
                    })?;
                    let content = choice.message.content.unwrap_or_default();
                    let finish_reason = choice.finish_reason.unwrap_or_default();
                    info!(
                        "Received {} characters, finish_reason: {}",
                        content.len(),
                        finish_reason
                    );
                    if finish_reason == "length" {
                        warn!("Response was truncated by the token limit");
                    }
                    return Ok(content);
                }
                Err(e) => {
                    warn!("Backend call failed (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.options.retry_backoff_ms))
                            .await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PrototypeError::Generation {
            reason: "no attempts were made".to_string(),
        }))
    }
}

/// Pulls the HTML document out of a model response.
///
/// A fenced block wins when it looks like a document, then a bare
/// `<!DOCTYPE html>` … `</html>` span. Anything else is wrapped in an
/// error page that shows the start of the response.
pub fn extract_html(content: &str) -> Result<String> {
    let fenced = compile(r"(?s)```(?:html|HTML)?\s*\n(.*?)```")?;
    if let Some(block) = fenced.captures(content).and_then(|caps| caps.get(1)) {
        let html = block.as_str().trim();
        if html.contains("<!DOCTYPE html>") || html.contains("<html") {
            return Ok(html.to_string());
        }
    }

    if let Some(start) = content.find("<!DOCTYPE html>") {
        if let Some(end) = content.rfind("</html>") {
            if end > start {
                return Ok(content[start..end + "</html>".len()].to_string());
            }
        }
    }

    warn!("No HTML document found in the response, writing a fallback page");
    let excerpt: String = content.chars().take(FALLBACK_EXCERPT_CHARS).collect();
    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Generation result</title>
    <script src="https://cdn.tailwindcss.com"></script>
</head>
<body class="bg-gray-100 p-8">
    <div class="bg-white rounded-lg shadow p-6 max-w-4xl mx-auto">
        <h1 class="text-xl font-bold text-red-600 mb-4">HTML extraction failed</h1>
        <p class="text-gray-600 mb-4">The response did not contain an HTML document:</p>
        <pre class="bg-gray-50 p-4 rounded text-sm overflow-auto">{}</pre>
    </div>
</body>
</html>"#,
        escape_html(&excerpt)
    ))
}

/// Decodes a `data:` URI (or bare base64) into `dir/<stem>.<ext>`.
///
/// Returns the written file name, or `None` when the payload is not valid
/// base64.
pub async fn save_data_uri_image(data: &str, dir: &Path, stem: &str) -> Result<Option<String>> {
    let (extension, payload) = match data.split_once(',') {
        Some((header, payload)) => {
            let mime = header
                .trim_start_matches("data:")
                .split(';')
                .next()
                .unwrap_or_default();
            (extension_for_mime(mime), payload)
        }
        None => ("jpg", data),
    };

    let bytes = match STANDARD.decode(payload.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Skipping reference image {}: {}", stem, e);
            return Ok(None);
        }
    };

    let filename = format!("{}.{}", stem, extension);
    fs::create_dir_all(dir).await?;
    fs::write(dir.join(&filename), bytes).await?;
    debug!("Saved reference image {}", filename);
    Ok(Some(filename))
}

/// Downloads remote `<img>` sources into `project_dir/images` and points
/// the markup at the local copies. Failed downloads keep their URL.
pub async fn localize_remote_images(html: &str, project_dir: &Path) -> Result<String> {
    let pattern = compile(
        r#"(?i)src=["']?(https?://[^"'>\s]+\.(jpg|jpeg|png|gif|webp|svg)[^"'>\s]*)["']?"#,
    )?;

    let mut urls: Vec<(String, String)> = Vec::new();
    for caps in pattern.captures_iter(html) {
        let url = caps[1].to_string();
        if !urls.iter().any(|(known, _)| known == &url) {
            urls.push((url, caps[2].to_ascii_lowercase()));
        }
    }
    if urls.is_empty() {
        return Ok(html.to_string());
    }

    let images_dir = project_dir.join(IMAGES_DIR);
    fs::create_dir_all(&images_dir).await?;

    let mut content = html.to_string();
    let mut saved = 0;
    for (index, (url, extension)) in urls.iter().enumerate() {
        match ContentFetcher::download_binary(url).await {
            Ok((bytes, _)) => {
                let filename = format!("img_{}.{}", index + 1, extension);
                fs::write(images_dir.join(&filename), bytes).await?;
                content = content.replace(url.as_str(), &format!("{}/{}", IMAGES_DIR, filename));
                debug!("Downloaded {} -> {}", url, filename);
                saved += 1;
            }
            Err(e) => warn!("Keeping remote image {}: {}", url, e),
        }
    }

    info!("Localized {}/{} remote images", saved, urls.len());
    Ok(content)
}

/// Status of background generation runs, keyed by project id.
#[derive(Clone, Default)]
pub struct GenerationTasks {
    inner: Arc<RwLock<HashMap<String, TaskSnapshot>>>,
}

impl GenerationTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: &str) {
        self.inner.write().await.insert(
            id.to_string(),
            TaskSnapshot {
                status: GenerationStatus::Pending,
                progress: 0,
                error: String::new(),
            },
        );
    }

    pub async fn progress(&self, id: &str, progress: u8) {
        if let Some(task) = self.inner.write().await.get_mut(id) {
            task.status = GenerationStatus::Generating;
            task.progress = progress.min(100);
        }
    }

    pub async fn complete(&self, id: &str) {
        if let Some(task) = self.inner.write().await.get_mut(id) {
            task.status = GenerationStatus::Completed;
            task.progress = 100;
        }
    }

    pub async fn fail(&self, id: &str, reason: &str) {
        if let Some(task) = self.inner.write().await.get_mut(id) {
            task.status = GenerationStatus::Failed;
            task.error = reason.to_string();
        }
    }

    pub async fn snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        self.inner.read().await.get(id).cloned()
    }
}

/// Runs generation requests against a project repository.
#[derive(Clone)]
pub struct Orchestrator {
    repository: Arc<ProjectRepository>,
    tasks: GenerationTasks,
    backend: Arc<dyn GenerationBackend>,
    model_name: Option<String>,
}

impl Orchestrator {
    pub fn new(
        repository: Arc<ProjectRepository>,
        backend: Arc<dyn GenerationBackend>,
        model_name: Option<String>,
    ) -> Self {
        Self {
            repository,
            tasks: GenerationTasks::new(),
            backend,
            model_name,
        }
    }

    pub fn tasks(&self) -> &GenerationTasks {
        &self.tasks
    }

    /// Creates the project and starts generating it in the background.
    ///
    /// The project folder, `record.json` and `prompt.txt` exist when this
    /// returns; `index.html` is written by the spawned task.
    pub async fn submit(
        &self,
        request: GenerationRequest,
    ) -> Result<(ProjectEntry, JoinHandle<()>)> {
        let (entry, prompt) = stage_project(
            &self.repository,
            &request,
            self.model_name.clone(),
            ProjectStatus::Generating,
        )
        .await?;

        self.tasks.register(&entry.id).await;
        info!("Project {} created, generating in the background", entry.id);

        let this = self.clone();
        let id = entry.id.clone();
        let images = request.images;
        let localize = request.localize_images;
        let handle = tokio::spawn(async move {
            if let Err(e) = this.run(&id, &prompt, &images, localize).await {
                error!("Generation of {} failed: {}", id, e);
                this.mark_failed(&id, &e.to_string()).await;
            }
        });

        Ok((entry, handle))
    }

    async fn run(&self, id: &str, prompt: &str, images: &[String], localize: bool) -> Result<()> {
        self.tasks.progress(id, 10).await;
        let project_dir = self.repository.require_project(id)?;

        self.tasks.progress(id, 20).await;
        let content = self.backend.complete(prompt, images).await?;
        self.tasks.progress(id, 80).await;

        if content.trim().is_empty() {
            return Err(PrototypeError::Generation {
                reason: "backend returned no content".to_string(),
            });
        }

        let mut html = extract_html(&content)?;
        if localize {
            html = localize_remote_images(&html, &project_dir).await?;
        }
        html = inject_navigation_listener(&html, DEFAULT_STATE_VAR)?;
        fs::write(project_dir.join(MARKUP_FILE), html).await?;

        self.set_record_status(id, ProjectStatus::Completed).await?;
        self.repository.set_status(id, None).await?;
        self.tasks.complete(id).await;

        info!("Generation of {} completed", id);
        Ok(())
    }

    async fn mark_failed(&self, id: &str, reason: &str) {
        self.tasks.fail(id, reason).await;
        if let Err(e) = self.repository.set_status(id, Some(ProjectStatus::Failed)).await {
            warn!("Cannot mark {} as failed in the manifest: {}", id, e);
        }
        if let Err(e) = self.set_record_status(id, ProjectStatus::Failed).await {
            warn!("Cannot mark {} as failed in its record: {}", id, e);
        }
    }

    async fn set_record_status(&self, id: &str, status: ProjectStatus) -> Result<()> {
        let mut record = self.repository.read_record(id).await?;
        record.status = Some(status);
        self.repository.write_record(id, &record).await
    }
}

/// Creates a project waiting for markup produced elsewhere: reference
/// images, `record.json` and `prompt.txt` are written, no backend is called.
pub async fn create_placeholder(
    repository: &ProjectRepository,
    request: &GenerationRequest,
    model_name: Option<String>,
) -> Result<(ProjectEntry, String)> {
    let staged = stage_project(repository, request, model_name, ProjectStatus::PendingExternal).await?;
    info!("Placeholder project {} created", staged.0.id);
    Ok(staged)
}

/// Creates the project folder and writes everything known before
/// generation. Returns the manifest entry and the prompt.
async fn stage_project(
    repository: &ProjectRepository,
    request: &GenerationRequest,
    model_name: Option<String>,
    status: ProjectStatus,
) -> Result<(ProjectEntry, String)> {
    let project_name = if request.project_name.trim().is_empty() {
        "Untitled project".to_string()
    } else {
        request.project_name.trim().to_string()
    };
    let listed_name = match status {
        ProjectStatus::PendingExternal => format!("{}{}", project_name, PENDING_NAME_SUFFIX),
        _ => project_name.clone(),
    };

    let entry = repository
        .create_project(&listed_name, model_name, Some(status))
        .await?;
    let reference_dir = repository.project_dir(&entry.id).join(REFERENCE_DIR);

    let mut saved_images = Vec::new();
    for (index, image) in request.images.iter().enumerate() {
        let stem = format!("ref_{}", index + 1);
        if let Some(filename) = save_data_uri_image(image, &reference_dir, &stem).await? {
            saved_images.push(filename);
        }
    }

    let mut record = request.record.clone();
    assign_reference_images(&mut record, &saved_images);
    record.status = Some(status);
    record.created_at = Local::now().format(DATE_FORMAT).to_string();
    repository.write_record(&entry.id, &record).await?;

    let prompt = request
        .prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| PromptBuilder::build(&project_name, &record));
    repository.write_prompt(&entry.id, &prompt).await?;

    Ok((entry, prompt))
}

/// Rewrites a project's markup according to a change request scoped to
/// the selected elements. The previous markup is kept as `index.html.bak`,
/// whose path is returned.
pub async fn refine_elements(
    repository: &ProjectRepository,
    backend: &dyn GenerationBackend,
    id: &str,
    request: &str,
    elements: &[ElementSelection],
) -> Result<PathBuf> {
    if request.trim().is_empty() {
        return Err(PrototypeError::Validation {
            reason: "change request is empty".to_string(),
        });
    }
    if elements.is_empty() {
        return Err(PrototypeError::Validation {
            reason: "no elements selected".to_string(),
        });
    }

    let dir = repository.require_project(id)?;
    let markup_path = dir.join(MARKUP_FILE);
    if !markup_path.is_file() {
        return Err(PrototypeError::FileNotFound {
            path: markup_path.display().to_string(),
        });
    }
    let current = fs::read_to_string(&markup_path).await?;
    info!("Refining {} element(s) of {}", elements.len(), id);

    let prompt = PromptBuilder::refinement(&current, elements, request);
    let content = backend.complete(&prompt, &[]).await?;
    let looks_like_document = content.contains("<html") || content.contains("<!DOCTYPE");
    if content.trim().chars().count() < MIN_REFINED_CHARS || !looks_like_document {
        return Err(PrototypeError::Generation {
            reason: "response is not a usable HTML document".to_string(),
        });
    }
    let html = extract_html(&content)?;

    let backup = dir.join(BACKUP_FILE);
    fs::write(&backup, &current).await?;
    fs::write(&markup_path, &html).await?;
    info!("Updated {}, backup at {}", markup_path.display(), backup.display());

    Ok(backup)
}

/// Hands out saved reference images to pages in order, `image_count` each.
pub fn assign_reference_images(record: &mut ProjectRecord, saved_images: &[String]) {
    let mut remaining = saved_images.iter();
    for page in &mut record.pages {
        if page.image_count == 0 {
            continue;
        }
        page.images = remaining.by_ref().take(page.image_count).cloned().collect();
    }
}
