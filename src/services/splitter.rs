use crate::error::{PrototypeError, Result};
use crate::services::extractor::{compile, PageGraphExtractor, DEFAULT_STATE_VAR};
use crate::services::routes::{route_filename, RouteTableParser};
use crate::types::{
    DerivedDocument, DocumentKind, ModeSelection, RouteEntry, SplitConfig, SplitMode, SplitPlan,
    SplitResult, StateDefinition, UnitOutcome,
};
use fs_extra::dir::CopyOptions;
use regex::{NoExpand, Regex};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

pub const MANIFEST_FILENAME: &str = "split_manifest.json";

/// What a single derived document is being rewritten for.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub state_var: &'a str,
    pub known_pages: &'a BTreeSet<String>,
    pub target: &'a str,
}

/// Turns one combined single-page app into standalone per-page documents.
pub struct SpaSplitter {
    extractor: PageGraphExtractor,
    routes: RouteTableParser,
    declaration_pattern: Regex,
    navigation_pattern: Regex,
    return_pattern: Regex,
    push_pattern: Regex,
    mount_pattern: Regex,
    mount_receiver_pattern: Regex,
    vue_destructure_pattern: Regex,
    setup_pattern: Regex,
    component_boundary_pattern: Regex,
    identifier_pattern: Regex,
}

impl SpaSplitter {
    pub fn new(state_var: &str, home_page: &str) -> Result<Self> {
        let var = regex::escape(state_var);

        Ok(Self {
            extractor: PageGraphExtractor::new(state_var, home_page)?,
            routes: RouteTableParser::new()?,
            declaration_pattern: compile(&format!(
                r#"const\s+{var}\s*=\s*ref\(\s*['"][^'"]*['"]\s*\)"#
            ))?,
            navigation_pattern: compile(&format!(
                r#"(^|[^\w$.])(?:this\.)?{var}(?:\.value)?\s*=\s*(["'])([^"']+)["']"#
            ))?,
            return_pattern: compile(r"return\s*\{")?,
            push_pattern: compile(
                r#"(^|[^\w$.])(?:this\.)?\$?router\.push\(\s*(['"])([^'"]+)['"]\s*\)"#,
            )?,
            mount_pattern: compile(r"\.mount\(")?,
            mount_receiver_pattern: compile(r"^([A-Za-z_$][\w$]*)((?:\s*\.\s*[\w$]+\([^()]*\))+)\s*$")?,
            vue_destructure_pattern: compile(r"const\s*\{([^}]*)\}\s*=\s*Vue\b")?,
            setup_pattern: compile(r"setup\s*\([^)]*\)\s*\{")?,
            component_boundary_pattern: compile(
                r"(?m)^\s*(?:const|let|var)\s+[A-Z][\w$]*\s*=\s*(?:defineComponent\(\s*)?\{",
            )?,
            identifier_pattern: compile(r"^[A-Za-z_$][\w$]*$")?,
        })
    }

    pub fn state_var(&self) -> &str {
        self.extractor.state_var()
    }

    pub fn detect_mode(&self, markup: &str) -> SplitMode {
        if self.routes.is_router_app(markup) {
            SplitMode::Router
        } else {
            SplitMode::Legacy
        }
    }

    /// Derives every standalone document without touching the filesystem.
    pub fn plan(
        &self,
        markup: &str,
        selection: ModeSelection,
        states: &[StateDefinition],
    ) -> Result<SplitPlan> {
        let mode = match selection {
            ModeSelection::Auto => self.detect_mode(markup),
            ModeSelection::Legacy => SplitMode::Legacy,
            ModeSelection::Router => SplitMode::Router,
        };
        info!("Planning split in {} mode", mode);

        match mode {
            SplitMode::Legacy => Ok(self.plan_legacy(markup, states)),
            SplitMode::Router => self.plan_router(markup, states),
        }
    }

    fn plan_legacy(&self, markup: &str, states: &[StateDefinition]) -> SplitPlan {
        let pages = self.extractor.guard_pages(markup);
        let mut plan = SplitPlan {
            mode: SplitMode::Legacy,
            documents: Vec::new(),
            outcomes: Vec::new(),
        };

        if pages.is_empty() {
            warn!(
                "No `v-if=\"{} === '…'\"` page guards found, nothing to split",
                self.state_var()
            );
        }

        for page in &pages {
            let context = RewriteContext {
                state_var: self.state_var(),
                known_pages: &pages,
                target: page,
            };
            let filename = format!("{}.html", page);
            plan.documents.push(DerivedDocument {
                filename: filename.clone(),
                kind: DocumentKind::Page { page: page.clone() },
                content: self.render_legacy_page(markup, &context),
            });
            plan.outcomes.push(UnitOutcome::Produced {
                unit: page.clone(),
                filename,
            });
        }

        for state in states {
            let outcome = match self.legacy_state_document(&plan, &pages, state) {
                Ok(document) => {
                    let filename = document.filename.clone();
                    plan.documents.push(document);
                    UnitOutcome::Produced {
                        unit: state.name.clone(),
                        filename,
                    }
                }
                Err(reason) => UnitOutcome::Skipped {
                    unit: state.name.clone(),
                    reason,
                },
            };
            plan.outcomes.push(outcome);
        }

        plan
    }

    fn legacy_state_document(
        &self,
        plan: &SplitPlan,
        pages: &BTreeSet<String>,
        state: &StateDefinition,
    ) -> std::result::Result<DerivedDocument, String> {
        let filename = format!("{}.html", state.name);
        if plan.document(&filename).is_some() {
            return Err(format!("{} is already produced", filename));
        }
        if !pages.contains(&state.base_page) {
            return Err(format!("unknown base page '{}'", state.base_page));
        }
        let base = plan
            .document(&format!("{}.html", state.base_page))
            .ok_or_else(|| format!("no document for base page '{}'", state.base_page))?;

        let setup = self
            .setup_pattern
            .find(&base.content)
            .ok_or_else(|| "no setup() block found".to_string())?;

        Ok(DerivedDocument {
            filename,
            kind: DocumentKind::State {
                base: state.base_page.clone(),
                description: state.description.clone(),
            },
            content: self.inject_state_hook(&base.content, setup.end(), &state.set_true),
        })
    }

    fn plan_router(&self, markup: &str, states: &[StateDefinition]) -> Result<SplitPlan> {
        let routes = self.routes.parse(markup)?;
        let mut plan = SplitPlan {
            mode: SplitMode::Router,
            documents: Vec::new(),
            outcomes: Vec::new(),
        };

        for route in &routes {
            let filename = format!("{}.html", route.filename);
            plan.documents.push(DerivedDocument {
                filename: filename.clone(),
                kind: DocumentKind::Route {
                    path: route.path.clone(),
                    component: route.component.clone(),
                },
                content: self.render_route(markup, route),
            });
            plan.outcomes.push(UnitOutcome::Produced {
                unit: route.path.clone(),
                filename,
            });
        }

        for state in states {
            let outcome = match self.router_state_document(&plan, &routes, state) {
                Ok(document) => {
                    let filename = document.filename.clone();
                    plan.documents.push(document);
                    UnitOutcome::Produced {
                        unit: state.name.clone(),
                        filename,
                    }
                }
                Err(reason) => UnitOutcome::Skipped {
                    unit: state.name.clone(),
                    reason,
                },
            };
            plan.outcomes.push(outcome);
        }

        Ok(plan)
    }

    fn router_state_document(
        &self,
        plan: &SplitPlan,
        routes: &[RouteEntry],
        state: &StateDefinition,
    ) -> std::result::Result<DerivedDocument, String> {
        let filename = format!("{}.html", state.name);
        if plan.document(&filename).is_some() {
            return Err(format!("{} is already produced", filename));
        }

        let route = resolve_base_route(routes, &state.base_page)
            .ok_or_else(|| format!("no route matches base page '{}'", state.base_page))?;
        let base = plan
            .document(&format!("{}.html", route.filename))
            .ok_or_else(|| format!("no document for route '{}'", route.path))?;

        let setup_end = self.component_setup(&base.content, &route.component)?;

        Ok(DerivedDocument {
            filename,
            kind: DocumentKind::State {
                base: route.filename.clone(),
                description: state.description.clone(),
            },
            content: self.inject_state_hook(&base.content, setup_end, &state.set_true),
        })
    }

    /// Offset just past the opening brace of `component`'s `setup(…) {`.
    fn component_setup(&self, content: &str, component: &str) -> std::result::Result<usize, String> {
        let definition = compile(&format!(
            r"(?:const|let|var)\s+{}\s*=\s*(?:defineComponent\(\s*)?\{{",
            regex::escape(component)
        ))
        .map_err(|e| e.to_string())?
        .find(content)
        .ok_or_else(|| format!("no definition found for component {}", component))?;

        let boundary = self
            .component_boundary_pattern
            .find_at(content, definition.end())
            .map(|m| m.start())
            .unwrap_or(content.len());

        match self.setup_pattern.find_at(content, definition.end()) {
            Some(setup) if setup.start() < boundary => Ok(setup.end()),
            _ => Err(format!("no setup() block found in component {}", component)),
        }
    }

    pub fn render_legacy_page(&self, markup: &str, context: &RewriteContext<'_>) -> String {
        let declaration = format!("const {} = ref('{}')", context.state_var, context.target);
        let mut content = if self.declaration_pattern.is_match(markup) {
            self.declaration_pattern
                .replacen(markup, 1, NoExpand(&declaration))
                .into_owned()
        } else {
            warn!(
                "{}: no `const {} = ref(...)` declaration, initial page left unchanged",
                context.target, context.state_var
            );
            markup.to_string()
        };

        content = self
            .navigation_pattern
            .replace_all(&content, |caps: &regex::Captures| {
                let target = &caps[3];
                if context.known_pages.contains(target) {
                    format!(
                        "{}window.location.href = {q}{}.html{q}",
                        &caps[1],
                        target,
                        q = &caps[2]
                    )
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();

        let (mut content, watch) = self.ensure_vue_import(&content, "watch");

        let Some(at) = self.return_pattern.find(&content).map(|m| m.start()) else {
            warn!(
                "{}: no `return {{` in setup, navigation watcher not injected",
                context.target
            );
            return content;
        };

        let indent = indentation_at(&content, at).to_string();
        let known = serde_json::to_string(context.known_pages).unwrap_or_else(|_| "[]".to_string());
        let watcher = format!(
            "// Navigation watcher\n\
             {i}{watch}({var}, (value) => {{\n\
             {i}    const knownPages = {known};\n\
             {i}    if (value !== '{target}' && knownPages.includes(value)) {{\n\
             {i}        window.location.href = value + '.html';\n\
             {i}    }}\n\
             {i}}});\n\
             {i}",
            i = indent,
            watch = watch,
            var = context.state_var,
            known = known,
            target = context.target,
        );
        content.insert_str(at, &watcher);
        content
    }

    pub fn render_route(&self, markup: &str, route: &RouteEntry) -> String {
        let mut content = self
            .push_pattern
            .replace_all(markup, |caps: &regex::Captures| {
                format!(
                    "{}window.location.href = {q}{}.html{q}",
                    &caps[1],
                    route_filename(&caps[3]),
                    q = &caps[2]
                )
            })
            .into_owned();

        let Some((mount_start, mount_end)) =
            self.mount_pattern.find(&content).map(|m| (m.start(), m.end()))
        else {
            warn!(
                "{}: no `.mount(` call found, initial route not forced",
                route.path
            );
            return content;
        };

        let line_start = content[..mount_start].rfind('\n').map_or(0, |i| i + 1);
        let statement_start = line_start + leading_whitespace(&content[line_start..]);
        let indent = indentation_at(&content, statement_start).to_string();
        let receiver = content[statement_start..mount_start].to_string();
        let replace = format!("router.replace('{}');", route.path);

        if receiver.is_empty() || receiver.starts_with(['}', ')', '.']) {
            // `}).mount(` continues the previous statement.
            let line_end = content[mount_end..]
                .find('\n')
                .map_or(content.len(), |i| mount_end + i);
            content.insert_str(line_end, &format!("\n{}{}", indent, replace));
        } else if let Some(caps) = self.mount_receiver_pattern.captures(&receiver) {
            // `app.use(router).mount(`: install first, then force the route.
            let rewritten = format!(
                "{app}{calls};\n{i}{replace}\n{i}{app}",
                app = &caps[1],
                calls = &caps[2],
                i = indent,
                replace = replace
            );
            content.replace_range(statement_start..mount_start, &rewritten);
        } else if receiver.contains('(') {
            let line_end = content[mount_end..]
                .find('\n')
                .map_or(content.len(), |i| mount_end + i);
            content.insert_str(line_end, &format!("\n{}{}", indent, replace));
        } else {
            content.insert_str(line_start, &format!("{}{}\n", indent, replace));
        }
        content
    }

    /// Makes `name` usable from the `const { … } = Vue` destructure and
    /// returns the expression to call it by.
    fn ensure_vue_import(&self, content: &str, name: &str) -> (String, String) {
        let Some(list) = self
            .vue_destructure_pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
        else {
            return (content.to_string(), format!("Vue.{}", name));
        };

        let present = list
            .as_str()
            .split(',')
            .filter_map(|item| item.split_whitespace().next())
            .any(|item| item.trim_end_matches(':') == name);
        if present {
            return (content.to_string(), name.to_string());
        }

        let trimmed = list.as_str().trim_end();
        let separator = if trimmed.trim().is_empty() || trimmed.ends_with(',') {
            " "
        } else {
            ", "
        };
        let mut updated = content.to_string();
        updated.insert_str(
            list.start() + trimmed.len(),
            &format!("{}{}", separator, name),
        );
        (updated, name.to_string())
    }

    fn inject_state_hook(&self, content: &str, setup_body: usize, flags: &[String]) -> String {
        let flags: Vec<&String> = flags
            .iter()
            .filter(|flag| {
                let valid = self.identifier_pattern.is_match(flag);
                if !valid {
                    warn!("Dropping state flag '{}': not an identifier", flag);
                }
                valid
            })
            .collect();

        let (mut updated, on_mounted) = self.ensure_vue_import(content, "onMounted");
        let offset = updated.len() - content.len();
        let setup_body = if offset > 0 && self.vue_import_precedes(content, setup_body) {
            setup_body + offset
        } else {
            setup_body
        };

        let line_start = updated[..setup_body].rfind('\n').map_or(0, |i| i + 1);
        let indent = format!(
            "{}    ",
            &updated[line_start..line_start + leading_whitespace(&updated[line_start..])]
        );

        let mut hook = format!("\n{}{}(() => {{", indent, on_mounted);
        for flag in flags {
            hook.push_str(&format!(
                "\n{i}    try {{ {f}.value = true; }} catch (e) {{ console.log('State injection failed for {f}'); }}",
                i = indent,
                f = flag
            ));
        }
        hook.push_str(&format!("\n{}}});", indent));

        updated.insert_str(setup_body, &hook);
        updated
    }

    fn vue_import_precedes(&self, content: &str, offset: usize) -> bool {
        self.vue_destructure_pattern
            .find(content)
            .map(|m| m.end() <= offset)
            .unwrap_or(false)
    }

    /// Plans and writes in one go.
    pub async fn split(&self, markup: &str, config: &SplitConfig, source: &str) -> Result<SplitResult> {
        let plan = self.plan(markup, config.mode, &config.states)?;
        Self::write_plan(&plan, config, source).await
    }

    pub async fn write_plan(
        plan: &SplitPlan,
        config: &SplitConfig,
        source: &str,
    ) -> Result<SplitResult> {
        info!(
            "Writing {} documents to {}",
            plan.documents.len(),
            config.output_dir.display()
        );

        Self::prepare_output_directory(&config.output_dir, config.force).await?;

        let copied_assets = match &config.asset_root {
            Some(root) => {
                Self::copy_assets(root, &config.markup_file, &config.output_dir).await?
            }
            None => Vec::new(),
        };

        let mut output_files = Vec::new();
        for document in &plan.documents {
            let path = config.output_dir.join(&document.filename);
            Self::write_document(&path, &document.content).await?;
            output_files.push(path);
        }

        for outcome in &plan.outcomes {
            if outcome.is_produced() {
                info!("{}", outcome);
            } else {
                warn!("{}", outcome);
            }
        }

        let metadata_file = if config.include_metadata {
            let path = config.output_dir.join(MANIFEST_FILENAME);
            Self::write_metadata_file(&path, source, plan).await?;
            Some(path)
        } else {
            None
        };

        let produced = plan.outcomes.iter().filter(|o| o.is_produced()).count();
        info!(
            "Split complete: {} produced, {} skipped, {} assets copied",
            produced,
            plan.outcomes.len() - produced,
            copied_assets.len()
        );

        Ok(SplitResult {
            mode: plan.mode,
            output_files,
            copied_assets,
            outcomes: plan.outcomes.clone(),
            metadata_file,
        })
    }

    async fn prepare_output_directory(output_dir: &Path, force: bool) -> Result<()> {
        if output_dir.exists() {
            let mut entries = fs::read_dir(output_dir).await?;
            if entries.next_entry().await?.is_some() {
                if !force {
                    return Err(PrototypeError::OutputDirectory {
                        reason: format!(
                            "{} is not empty (use --force to overwrite)",
                            output_dir.display()
                        ),
                    });
                }
                info!("Clearing output directory: {}", output_dir.display());
                fs::remove_dir_all(output_dir).await?;
            }
        }

        if !output_dir.exists() {
            fs::create_dir_all(output_dir).await.map_err(|e| {
                PrototypeError::OutputDirectory {
                    reason: format!("Failed to create output directory: {}", e),
                }
            })?;
            info!("Created output directory: {}", output_dir.display());
        }
        Ok(())
    }

    /// Copies every sibling of the markup file into the output directory.
    async fn copy_assets(root: &Path, markup_file: &str, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let output_dir = fs::canonicalize(output_dir).await?;
        let mut copied = Vec::new();
        let mut options = CopyOptions::new();
        options.overwrite = true;

        let mut entries = fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy() == markup_file {
                continue;
            }

            let source = fs::canonicalize(entry.path()).await?;
            if output_dir.starts_with(&source) {
                debug!("Skipping {}: contains the output directory", source.display());
                continue;
            }

            let target = output_dir.join(&name);
            if entry.file_type().await?.is_dir() {
                fs_extra::dir::copy(&source, &output_dir, &options)?;
            } else {
                fs::copy(&source, &target).await?;
            }
            debug!("Copied asset {}", target.display());
            copied.push(target);
        }

        Ok(copied)
    }

    async fn write_document(path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).await.map_err(|e| PrototypeError::OutputDirectory {
            reason: format!("Failed to write {}: {}", path.display(), e),
        })
    }

    async fn write_metadata_file(path: &Path, source: &str, plan: &SplitPlan) -> Result<()> {
        let metadata = serde_json::json!({
            "source": source,
            "mode": plan.mode,
            "created_at": chrono::Utc::now().to_rfc3339(),
            "files": plan.documents.iter().map(|d| d.filename.as_str()).collect::<Vec<_>>(),
            "documents": plan.documents.iter().map(|d| {
                serde_json::json!({
                    "filename": d.filename,
                    "unit": d.kind,
                    "size": d.content.len(),
                })
            }).collect::<Vec<_>>(),
            "outcomes": plan.outcomes,
        });

        fs::write(path, serde_json::to_string_pretty(&metadata)?).await?;
        info!("Generated split manifest: {}", path.display());
        Ok(())
    }
}

impl Default for SpaSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_VAR, crate::services::extractor::DEFAULT_HOME_PAGE)
            .unwrap_or_else(|e| panic!("default splitter patterns: {}", e))
    }
}

/// Base route for a state: by output filename first, then by path.
fn resolve_base_route<'a>(routes: &'a [RouteEntry], base: &str) -> Option<&'a RouteEntry> {
    routes.iter().find(|r| r.filename == base).or_else(|| {
        let slashed = format!("/{}", base);
        routes.iter().find(|r| r.path == slashed || r.path == base)
    })
}

fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start_matches([' ', '\t']).len()
}

/// Whitespace between the start of the line and `pos`, if that is all
/// there is.
fn indentation_at(content: &str, pos: usize) -> &str {
    let line_start = content[..pos].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &content[line_start..pos];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

/// Loads a JSON array of state definitions.
pub async fn load_states(path: &Path) -> Result<Vec<StateDefinition>> {
    let raw = fs::read_to_string(path).await?;
    let states: Vec<StateDefinition> = serde_json::from_str(&raw)?;

    let mut seen = HashSet::new();
    for state in &states {
        if !seen.insert(state.name.as_str()) {
            warn!("Duplicate state name '{}': later entry will be skipped", state.name);
        }
    }

    debug!("Loaded {} state definitions from {}", states.len(), path.display());
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LEGACY: &str = r#"<!DOCTYPE html>
<html>
<body>
<div id="app">
  <div v-if="currentPage === 'home'">
    <button @click="currentPage = 'scan'">Scan</button>
  </div>
  <div v-if="currentPage === 'scan'">
    <button @click="goToHome">Back</button>
    <div v-if="showPhotoModal">photo</div>
  </div>
</div>
<script>
  const { createApp, ref } = Vue;
  createApp({
    setup() {
      const currentPage = ref('home');
      const showPhotoModal = ref(false);
      const goToHome = () => { currentPage.value = 'home'; };
      return { currentPage, showPhotoModal, goToHome };
    }
  }).mount('#app');
</script>
</body>
</html>"#;

    const ROUTER: &str = r#"<!DOCTYPE html>
<html>
<body>
<div id="app"><router-view></router-view></div>
<script>
  const { createApp, ref } = Vue;
  const Home = {
    template: `<button @click="$router.push('/scan')">Scan</button>`,
    setup() {
      const go = () => router.push('/scan');
      return { go };
    }
  };
  const Scan = {
    template: `<div v-if="showPhotoModal">photo</div>`,
    setup() {
      const showPhotoModal = ref(false);
      return { showPhotoModal };
    }
  };
  const routes = [
    { path: '/', component: Home },
    { path: '/scan', component: Scan },
  ];
  const router = VueRouter.createRouter({ history: VueRouter.createWebHashHistory(), routes });
  const app = createApp({});
  app.use(router);
  app.mount('#app');
</script>
</body>
</html>"#;

    fn camera_state(flag: &str) -> StateDefinition {
        StateDefinition {
            name: "cameraModal".to_string(),
            description: "photo picker open".to_string(),
            base_page: "scan".to_string(),
            set_true: vec![flag.to_string()],
        }
    }

    #[test]
    fn test_mode_detection() {
        let splitter = SpaSplitter::default();
        assert_eq!(splitter.detect_mode(LEGACY), SplitMode::Legacy);
        assert_eq!(splitter.detect_mode(ROUTER), SplitMode::Router);
    }

    #[test]
    fn test_legacy_without_guards_produces_nothing() {
        let splitter = SpaSplitter::default();
        let plan = splitter
            .plan("<html><body>static</body></html>", ModeSelection::Legacy, &[])
            .unwrap();
        assert!(plan.documents.is_empty());
        assert!(plan.outcomes.is_empty());
    }

    #[test]
    fn test_legacy_documents_carry_their_initial_page() {
        let splitter = SpaSplitter::default();
        let plan = splitter.plan(LEGACY, ModeSelection::Auto, &[]).unwrap();
        assert_eq!(plan.mode, SplitMode::Legacy);
        assert_eq!(plan.documents.len(), 2);

        let home = plan.document("home.html").unwrap();
        let scan = plan.document("scan.html").unwrap();
        assert!(home.content.contains("const currentPage = ref('home')"));
        assert!(scan.content.contains("const currentPage = ref('scan')"));
        assert!(!scan.content.contains("ref('home')"));

        // Same-length names: the two documents differ only in the literal
        // and the watcher's own page.
        assert_eq!(home.content.len(), scan.content.len());
        let rebased = home
            .content
            .replace("ref('home')", "ref('scan')")
            .replace("value !== 'home'", "value !== 'scan'");
        assert_eq!(rebased, scan.content);
    }

    #[test]
    fn test_legacy_navigation_rewrites_and_watcher() {
        let splitter = SpaSplitter::default();
        let plan = splitter.plan(LEGACY, ModeSelection::Legacy, &[]).unwrap();
        let home = &plan.document("home.html").unwrap().content;

        assert!(home.contains(r#"@click="window.location.href = 'scan.html'""#));
        assert!(home.contains("window.location.href = 'home.html'; };"));
        assert!(home.contains("const { createApp, ref, watch } = Vue;"));
        assert!(home.contains(r#"const knownPages = ["home","scan"];"#));

        let watcher = home.find("watch(currentPage").unwrap();
        let ret = home.find("return { currentPage").unwrap();
        assert!(watcher < ret);
        // The guards themselves are untouched.
        assert!(home.contains(r#"v-if="currentPage === 'scan'""#));
    }

    #[test]
    fn test_legacy_without_destructure_uses_qualified_watch() {
        let splitter = SpaSplitter::default();
        let markup = LEGACY.replace("const { createApp, ref } = Vue;", "");
        let plan = splitter.plan(&markup, ModeSelection::Legacy, &[]).unwrap();
        assert!(plan.document("home.html").unwrap().content.contains("Vue.watch(currentPage"));
    }

    #[test]
    fn test_legacy_state_document() {
        let splitter = SpaSplitter::default();
        let plan = splitter
            .plan(LEGACY, ModeSelection::Legacy, &[camera_state("showPhotoModal")])
            .unwrap();
        let state = plan.document("cameraModal.html").unwrap();
        assert!(state.content.contains("const currentPage = ref('scan')"));
        assert!(state.content.contains("showPhotoModal.value = true;"));
        assert!(state.content.contains("const { createApp, ref, watch, onMounted } = Vue;"));
    }

    #[test]
    fn test_router_example() {
        let splitter = SpaSplitter::default();
        let plan = splitter.plan(ROUTER, ModeSelection::Auto, &[]).unwrap();
        assert_eq!(plan.mode, SplitMode::Router);

        let home = &plan.document("home.html").unwrap().content;
        let scan = &plan.document("scan.html").unwrap().content;
        assert!(home.contains("  router.replace('/');\n  app.mount('#app');"));
        assert!(scan.contains("  router.replace('/scan');\n  app.mount('#app');"));

        for document in &plan.documents {
            assert!(!document.content.contains("router.push("));
            assert!(document
                .content
                .contains(r#"@click="window.location.href = 'scan.html'""#));
            assert!(document
                .content
                .contains("const go = () => window.location.href = 'scan.html';"));
        }
    }

    #[test]
    fn test_router_chained_mount() {
        let splitter = SpaSplitter::default();
        let markup = r#"const routes = [ { path: '/', component: Home } ];
createApp({
  setup() {}
}).use(router).mount('#app');
"#;
        let plan = splitter.plan(markup, ModeSelection::Router, &[]).unwrap();
        let home = &plan.document("home.html").unwrap().content;
        assert!(home.contains("}).use(router).mount('#app');\nrouter.replace('/');"));
    }

    #[test]
    fn test_router_mount_after_use_on_one_line() {
        let splitter = SpaSplitter::default();
        let markup = "const routes = [ { path: '/scan', component: Scan } ];\n  app.use(router).mount('#app');\n";
        let plan = splitter.plan(markup, ModeSelection::Router, &[]).unwrap();
        let scan = &plan.document("scan.html").unwrap().content;
        assert!(scan.contains(
            "  app.use(router);\n  router.replace('/scan');\n  app.mount('#app');\n"
        ));
    }

    #[test]
    fn test_router_push_through_this_receiver() {
        let splitter = SpaSplitter::default();
        let markup = ROUTER.replace(
            "const go = () => router.push('/scan');",
            "const go = () => this.$router.push('/scan'); subrouter.push('/scan');",
        );
        let plan = splitter.plan(&markup, ModeSelection::Router, &[]).unwrap();
        let home = &plan.document("home.html").unwrap().content;

        assert!(home.contains("const go = () => window.location.href = 'scan.html';"));
        assert!(!home.contains("this.window"));
        assert!(home.contains("subrouter.push('/scan');"));
        assert!(home.contains(r#"@click="window.location.href = 'scan.html'""#));
    }

    #[test]
    fn test_legacy_assignment_through_this_receiver() {
        let splitter = SpaSplitter::default();
        let markup = LEGACY.replace(
            "const goToHome = () => { currentPage.value = 'home'; };",
            "const goToHome = () => { currentPage.value = 'home'; };\n      const methods = { go() { this.currentPage = 'scan'; }, keep() { state.currentPage = 'scan'; } };",
        );
        let plan = splitter.plan(&markup, ModeSelection::Legacy, &[]).unwrap();
        let home = &plan.document("home.html").unwrap().content;

        assert!(home.contains("go() { window.location.href = 'scan.html'; }"));
        assert!(!home.contains("this.window"));
        assert!(home.contains("keep() { state.currentPage = 'scan'; }"));
    }

    #[test]
    fn test_router_state_hook_in_component_setup() {
        let splitter = SpaSplitter::default();
        let plan = splitter
            .plan(ROUTER, ModeSelection::Router, &[camera_state("showPhotoModal")])
            .unwrap();

        let state = &plan.document("cameraModal.html").unwrap().content;
        assert!(state.contains("router.replace('/scan');"));
        assert!(state.contains("const { createApp, ref, onMounted } = Vue;"));

        let scan_def = state.find("const Scan = {").unwrap();
        let hook = state.find("onMounted(() => {").unwrap();
        let routes_def = state.find("const routes = [").unwrap();
        assert!(hook > scan_def && hook < routes_def);
        assert!(state.contains(
            "try { showPhotoModal.value = true; } catch (e) { console.log('State injection failed for showPhotoModal'); }"
        ));
        assert!(plan.outcomes.iter().all(|o| o.is_produced()));
    }

    #[test]
    fn test_router_state_with_absent_flag_still_produced() {
        let splitter = SpaSplitter::default();
        let plan = splitter
            .plan(ROUTER, ModeSelection::Router, &[camera_state("showCameraSheet")])
            .unwrap();
        let state = &plan.document("cameraModal.html").unwrap().content;
        assert!(state.contains("onMounted(() => {"));
        assert!(state.contains("showCameraSheet.value = true"));
    }

    #[test]
    fn test_router_state_skips() {
        let splitter = SpaSplitter::default();
        let mut unknown = camera_state("showPhotoModal");
        unknown.base_page = "missing".to_string();
        let mut clash = camera_state("showPhotoModal");
        clash.name = "scan".to_string();

        let plan = splitter
            .plan(ROUTER, ModeSelection::Router, &[unknown, clash])
            .unwrap();
        assert_eq!(plan.documents.len(), 2);
        assert_eq!(plan.skipped().count(), 2);
    }

    #[test]
    fn test_router_state_skipped_without_component_definition() {
        let splitter = SpaSplitter::default();
        let markup = ROUTER.replace("const Scan = {", "const ScanPage = {");
        let plan = splitter
            .plan(&markup, ModeSelection::Router, &[camera_state("showPhotoModal")])
            .unwrap();

        assert_eq!(plan.documents.len(), 2);
        assert!(plan.document("home.html").is_some());
        assert!(plan.document("scan.html").is_some());
        assert!(plan.document("cameraModal.html").is_none());
        let skipped: Vec<&UnitOutcome> = plan.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            skipped[0],
            UnitOutcome::Skipped { unit, reason } if unit == "cameraModal" && reason.contains("no definition")
        ));
    }

    #[test]
    fn test_router_state_skipped_when_setup_is_past_component() {
        let splitter = SpaSplitter::default();
        let markup = ROUTER
            .replace(
                "    setup() {\n      const showPhotoModal = ref(false);\n      return { showPhotoModal };\n    }",
                "    data() {\n      return { showPhotoModal: false };\n    }",
            )
            .replace(
                "  const routes = [",
                "  const Profile = {\n    setup() {\n      return {};\n    }\n  };\n  const routes = [",
            );
        assert!(markup.contains("data() {"));

        let plan = splitter
            .plan(&markup, ModeSelection::Router, &[camera_state("showPhotoModal")])
            .unwrap();

        assert_eq!(plan.documents.len(), 2);
        assert!(!plan.documents.iter().any(|d| d.content.contains("onMounted(")));
        let skipped: Vec<&UnitOutcome> = plan.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            skipped[0],
            UnitOutcome::Skipped { reason, .. } if reason.contains("no setup() block")
        ));
    }

    #[test]
    fn test_invalid_flags_are_dropped() {
        let splitter = SpaSplitter::default();
        let mut state = camera_state("showPhotoModal");
        state.set_true.push("bad flag()".to_string());
        let plan = splitter.plan(ROUTER, ModeSelection::Router, &[state]).unwrap();
        let content = &plan.document("cameraModal.html").unwrap().content;
        assert!(!content.contains("bad flag()"));
    }

    #[test]
    fn test_missing_router_table_aborts() {
        let splitter = SpaSplitter::default();
        let markup = "const router = VueRouter.createRouter({});";
        assert!(matches!(
            splitter.plan(markup, ModeSelection::Auto, &[]),
            Err(PrototypeError::RouterTable { .. })
        ));
    }

    #[test]
    fn test_route_collision_aborts() {
        let splitter = SpaSplitter::default();
        let markup = "const routes = [ { path: '/a/b', component: A }, { path: '/a-b', component: B } ];";
        assert!(matches!(
            splitter.plan(markup, ModeSelection::Router, &[]),
            Err(PrototypeError::RouteCollision { .. })
        ));
    }

    #[test]
    fn test_missing_mount_still_produces_document() {
        let splitter = SpaSplitter::default();
        let markup = "const routes = [ { path: '/', component: Home } ];";
        let plan = splitter.plan(markup, ModeSelection::Router, &[]).unwrap();
        assert_eq!(plan.documents[0].content, markup);
    }

    fn config(output_dir: PathBuf, asset_root: Option<PathBuf>) -> SplitConfig {
        SplitConfig {
            output_dir,
            asset_root,
            markup_file: "index.html".to_string(),
            mode: ModeSelection::Auto,
            states: Vec::new(),
            force: false,
            include_metadata: true,
        }
    }

    #[tokio::test]
    async fn test_write_plan_copies_assets_and_manifest() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(project.join("images")).unwrap();
        std::fs::write(project.join("index.html"), ROUTER).unwrap();
        std::fs::write(project.join("style.css"), "body {}").unwrap();
        std::fs::write(project.join("images/logo.png"), [0u8, 1, 2]).unwrap();

        // Output nested inside the project directory must not copy itself.
        let output = project.join("split");
        let splitter = SpaSplitter::default();
        let result = splitter
            .split(ROUTER, &config(output.clone(), Some(project.clone())), "index.html")
            .await
            .unwrap();

        assert_eq!(result.mode, SplitMode::Router);
        assert_eq!(result.output_files.len(), 2);
        assert!(output.join("home.html").exists());
        assert!(output.join("scan.html").exists());
        assert!(output.join("style.css").exists());
        assert!(output.join("images/logo.png").exists());
        assert!(!output.join("index.html").exists());
        assert!(!output.join("split").exists());
        assert_eq!(result.copied_assets.len(), 2);

        let manifest: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(result.metadata_file.unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["mode"], "router");
        assert_eq!(manifest["files"][0], "home.html");
        assert_eq!(manifest["outcomes"][1]["outcome"], "produced");
    }

    #[tokio::test]
    async fn test_non_empty_output_requires_force() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("stale.html"), "old").unwrap();

        let splitter = SpaSplitter::default();
        let mut cfg = config(output.clone(), None);
        let err = splitter.split(LEGACY, &cfg, "index.html").await.unwrap_err();
        assert!(matches!(err, PrototypeError::OutputDirectory { .. }));

        cfg.force = true;
        splitter.split(LEGACY, &cfg, "index.html").await.unwrap();
        assert!(!output.join("stale.html").exists());
        assert!(output.join("home.html").exists());
    }

    #[tokio::test]
    async fn test_load_states() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("states.json");
        std::fs::write(
            &path,
            r#"[{"name":"cameraModal","base_page":"scan","set_true":["showPhotoModal"]}]"#,
        )
        .unwrap();
        let states = load_states(&path).await.unwrap();
        assert_eq!(states, vec![StateDefinition {
            description: String::new(),
            ..camera_state("showPhotoModal")
        }]);
    }
}
