use crate::error::{PrototypeError, Result};
use crate::types::{ModalComponent, Page, PageGraph, Transition, TransitionKind};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

pub const DEFAULT_STATE_VAR: &str = "currentPage";
pub const DEFAULT_HOME_PAGE: &str = "home";

/// Identifiers at or above this length are almost always a captured code
/// or string literal rather than a page token.
const MAX_PAGE_ID_LEN: usize = 50;
const MAX_MODAL_NAME_LEN: usize = 30;
const MODAL_DENYLIST: [&str; 3] = ["loading", "error", "success"];
const MODAL_LABEL_SUFFIX: &str = "弹窗";

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| PrototypeError::Pattern {
        reason: format!("{}: {}", pattern, e),
    })
}

/// Scans generated markup for pages, transitions and modal flags.
pub struct PageGraphExtractor {
    state_var: String,
    home_page: String,
    guard_pattern: Regex,
    assignment_pattern: Regex,
    click_handler_pattern: Regex,
    navigate_call_pattern: Regex,
    modal_patterns: Vec<Regex>,
}

impl PageGraphExtractor {
    pub fn new(state_var: &str, home_page: &str) -> Result<Self> {
        let var = regex::escape(state_var);

        let guard_pattern = compile(&format!(
            r#"v-if\s*=\s*["']{var}(?:\.value)?\s*===?\s*["']([^"']+)["']"#
        ))?;
        let assignment_pattern =
            compile(&format!(r#"\b{var}(?:\.value)?\s*=\s*["']([^"']+)["']"#))?;
        let click_handler_pattern = compile(
            r#"(?:@click|v-on:click)\s*=\s*["'][^"']*?\bgo(?:To)?([A-Z][A-Za-z0-9]*)"#,
        )?;
        let navigate_call_pattern = compile(r#"navigateTo\(\s*["']([^"']+)["']\s*\)"#)?;

        let modal_patterns = vec![
            // v-if="showPhotoModal" / v-show="showShare"
            compile(r#"v-(?:if|show)\s*=\s*["']show(\w+)["']"#)?,
            // const shareDialog = ref(false)
            compile(r"(\w+(?:Modal|Dialog|Popup))\s*=\s*ref\(")?,
        ];

        Ok(Self {
            state_var: state_var.to_string(),
            home_page: home_page.to_string(),
            guard_pattern,
            assignment_pattern,
            click_handler_pattern,
            navigate_call_pattern,
            modal_patterns,
        })
    }

    pub fn state_var(&self) -> &str {
        &self.state_var
    }

    pub fn home_page(&self) -> &str {
        &self.home_page
    }

    pub fn extract(&self, markup: &str) -> PageGraph {
        let pages = self.extract_pages(markup);
        let mut transitions = self.extract_transitions(markup, &pages);
        self.attach_isolated_pages(&pages, &mut transitions);
        let modals = self.extract_modals(markup);

        debug!(
            "Extracted {} pages, {} transitions, {} modals",
            pages.len(),
            transitions.len(),
            modals.len()
        );

        PageGraph {
            pages,
            transitions,
            modals,
        }
    }

    /// Pages named by either a rendering guard or an assignment.
    pub fn extract_pages(&self, markup: &str) -> BTreeSet<String> {
        let mut pages = self.guard_pages(markup);
        pages.extend(
            self.assignment_pattern
                .captures_iter(markup)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str())
                .filter(|candidate| is_page_candidate(candidate))
                .map(str::to_string),
        );
        pages
    }

    /// Pages named by a `v-if="currentPage === '…'"` guard only.
    pub fn guard_pages(&self, markup: &str) -> BTreeSet<String> {
        self.guard_pattern
            .captures_iter(markup)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|candidate| is_page_candidate(candidate))
            .map(str::to_string)
            .collect()
    }

    fn extract_transitions(&self, markup: &str, pages: &BTreeSet<String>) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let mut seen = HashSet::new();

        let guards: Vec<(String, usize, usize)> = self
            .guard_pattern
            .captures_iter(markup)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let page = caps.get(1)?;
                Some((page.as_str().to_string(), whole.start(), whole.end()))
            })
            .collect();

        for (idx, (page, _, body_start)) in guards.iter().enumerate() {
            if !pages.contains(page) {
                continue;
            }

            let body_end = guards
                .get(idx + 1)
                .map(|(_, next_start, _)| *next_start)
                .unwrap_or(markup.len());
            let block = &markup[*body_start..body_end];

            for target in self.block_targets(block) {
                let (to, kind) = target;
                if to == *page || !pages.contains(&to) {
                    continue;
                }
                if seen.insert((page.clone(), to.clone())) {
                    transitions.push(Transition {
                        from: page.clone(),
                        to,
                        kind,
                    });
                }
            }
        }

        transitions
    }

    /// Navigation targets named inside one page block, in scan order.
    fn block_targets(&self, block: &str) -> Vec<(String, TransitionKind)> {
        let mut targets = Vec::new();

        for caps in self.assignment_pattern.captures_iter(block) {
            if let Some(m) = caps.get(1) {
                targets.push((m.as_str().to_string(), TransitionKind::Direct));
            }
        }

        for caps in self.click_handler_pattern.captures_iter(block) {
            if let Some(m) = caps.get(1) {
                targets.push((lowercase_first(m.as_str()), TransitionKind::Method));
            }
        }

        for caps in self.navigate_call_pattern.captures_iter(block) {
            if let Some(m) = caps.get(1) {
                targets.push((m.as_str().to_string(), TransitionKind::Navigate));
            }
        }

        targets
    }

    /// Links every page without edges to the home page so the diagram has
    /// no floating nodes.
    fn attach_isolated_pages(&self, pages: &BTreeSet<String>, transitions: &mut Vec<Transition>) {
        if !pages.contains(&self.home_page) {
            return;
        }

        let connected: HashSet<&str> = transitions
            .iter()
            .flat_map(|t| [t.from.as_str(), t.to.as_str()])
            .collect();

        let isolated: Vec<String> = pages
            .iter()
            .filter(|page| **page != self.home_page && !connected.contains(page.as_str()))
            .cloned()
            .collect();

        for page in isolated {
            transitions.push(Transition {
                from: self.home_page.clone(),
                to: page,
                kind: TransitionKind::Inferred,
            });
        }
    }

    pub fn extract_modals(&self, markup: &str) -> Vec<ModalComponent> {
        let mut modals: BTreeMap<String, ModalComponent> = BTreeMap::new();

        for pattern in &self.modal_patterns {
            for caps in pattern.captures_iter(markup) {
                let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                let clean = strip_modal_conventions(name);
                if clean.is_empty()
                    || clean.chars().count() >= MAX_MODAL_NAME_LEN
                    || MODAL_DENYLIST.contains(&clean.to_lowercase().as_str())
                {
                    continue;
                }

                modals
                    .entry(clean.to_string())
                    .or_insert_with(|| ModalComponent {
                        name: name.to_string(),
                        label: format!("{}{}", clean, MODAL_LABEL_SUFFIX),
                    });
            }
        }

        modals.into_values().collect()
    }

    pub fn labeled_pages(&self, graph: &PageGraph) -> Vec<Page> {
        graph
            .pages
            .iter()
            .map(|name| Page {
                name: name.clone(),
                label: page_label(name),
                route: None,
            })
            .collect()
    }
}

impl Default for PageGraphExtractor {
    fn default() -> Self {
        // The default patterns are fixed and known to compile.
        Self::new(DEFAULT_STATE_VAR, DEFAULT_HOME_PAGE)
            .unwrap_or_else(|e| panic!("default extractor patterns: {}", e))
    }
}

fn is_page_candidate(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.chars().count() < MAX_PAGE_ID_LEN
        && !candidate.starts_with('!')
}

fn lowercase_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn strip_modal_conventions(name: &str) -> &str {
    let name = name
        .strip_prefix("show")
        .or_else(|| name.strip_prefix("Show"))
        .unwrap_or(name);
    ["Modal", "Dialog", "Popup"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

/// Display label for a page identifier.
pub fn page_label(page: &str) -> String {
    let label = match page {
        "home" => "首页",
        "scan" => "扫描页",
        "result" => "结果页",
        "analysis" => "解析页",
        "aiTutor" => "AI讲题",
        "wrongBookHome" => "错题本首页",
        "wrongBookList" => "错题列表",
        "wrongBookDetail" => "错题详情",
        "login" => "登录",
        "register" => "注册",
        "profile" => "个人中心",
        "settings" => "设置",
        "detail" => "详情页",
        "list" => "列表页",
        other => other,
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = r#"
<div id="app">
  <div v-if="currentPage === 'home'">
    <button @click="currentPage = 'scan'">Scan</button>
    <button @click="navigateTo('profile')">Me</button>
  </div>
  <div v-if="currentPage === 'scan'">
    <button @click="goToResult">Submit</button>
    <div v-if="showPhotoModal">photo</div>
  </div>
  <div v-if="currentPage === 'result'">
    <button @click="currentPage = 'home'">Back</button>
  </div>
  <div v-if="currentPage === 'profile'"></div>
  <div v-if="currentPage === 'settings'"></div>
</div>
<script>
  const { createApp, ref } = Vue;
  createApp({
    setup() {
      const currentPage = ref('home');
      const showPhotoModal = ref(false);
      const shareDialog = ref(false);
      const showLoading = ref(false);
      return { currentPage, showPhotoModal, shareDialog, showLoading };
    }
  }).mount('#app');
</script>
"#;

    #[test]
    fn test_empty_input_yields_empty_graph() {
        let extractor = PageGraphExtractor::default();
        let graph = extractor.extract("");
        assert!(graph.is_empty());

        let graph = extractor.extract("<html><body><p>static</p></body></html>");
        assert!(graph.is_empty());
    }

    #[test]
    fn test_pages_from_guards_and_assignments() {
        let extractor = PageGraphExtractor::default();
        let markup = r#"<div v-if="currentPage === 'home'"></div>
            <script>function go() { currentPage.value = 'orphan'; }</script>"#;
        let pages = extractor.extract_pages(markup);
        assert!(pages.contains("home"));
        assert!(pages.contains("orphan"));
        assert_eq!(extractor.guard_pages(markup).len(), 1);
    }

    #[test]
    fn test_sanity_filter_drops_long_and_negated_candidates() {
        let extractor = PageGraphExtractor::default();
        let long = "x".repeat(60);
        let markup = format!(
            r#"<div v-if="currentPage === '{}'"></div><div v-if="currentPage == '!home'"></div>"#,
            long
        );
        assert!(extractor.extract_pages(&markup).is_empty());
    }

    #[test]
    fn test_transitions_by_kind() {
        let extractor = PageGraphExtractor::default();
        let graph = extractor.extract(APP);

        let find = |from: &str, to: &str| {
            graph
                .transitions
                .iter()
                .find(|t| t.from == from && t.to == to)
                .map(|t| t.kind)
        };

        assert_eq!(find("home", "scan"), Some(TransitionKind::Direct));
        assert_eq!(find("home", "profile"), Some(TransitionKind::Navigate));
        assert_eq!(find("scan", "result"), Some(TransitionKind::Method));
        assert_eq!(find("result", "home"), Some(TransitionKind::Direct));
    }

    #[test]
    fn test_isolated_page_gets_one_inferred_edge() {
        let extractor = PageGraphExtractor::default();
        let graph = extractor.extract(APP);

        let inferred: Vec<&Transition> = graph
            .transitions
            .iter()
            .filter(|t| t.kind == TransitionKind::Inferred)
            .collect();

        assert_eq!(inferred.len(), 1);
        assert_eq!(inferred[0].from, "home");
        assert_eq!(inferred[0].to, "settings");
    }

    #[test]
    fn test_no_inferred_edges_without_home() {
        let extractor = PageGraphExtractor::default();
        let markup = r#"<div v-if="currentPage === 'a'"></div><div v-if="currentPage === 'b'"></div>"#;
        let graph = extractor.extract(markup);
        assert_eq!(graph.pages.len(), 2);
        assert!(graph.transitions.is_empty());
    }

    #[test]
    fn test_duplicate_edges_collapse_to_first_kind() {
        let extractor = PageGraphExtractor::default();
        let markup = r#"
<div v-if="currentPage === 'scan'">
  <button @click="currentPage.value = 'result'">a</button>
  <button @click="goToResult">b</button>
</div>
<div v-if="currentPage === 'result'"></div>"#;
        let graph = extractor.extract(markup);
        let edges: Vec<&Transition> = graph
            .transitions
            .iter()
            .filter(|t| t.from == "scan" && t.to == "result")
            .collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, TransitionKind::Direct);
    }

    #[test]
    fn test_edges_to_unknown_pages_are_dropped() {
        let extractor = PageGraphExtractor::default();
        let markup = r#"<div v-if="currentPage === 'home'"><a @click="navigateTo('nowhere')"></a></div>"#;
        let graph = extractor.extract(markup);
        assert!(graph.transitions.is_empty());
    }

    #[test]
    fn test_modals_are_cleaned_filtered_and_sorted() {
        let extractor = PageGraphExtractor::default();
        let modals = extractor.extract_modals(APP);
        let labels: Vec<&str> = modals.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["Photo弹窗", "share弹窗"]);
        assert_eq!(modals[0].name, "PhotoModal");
        assert_eq!(modals[1].name, "shareDialog");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = PageGraphExtractor::default();
        assert_eq!(extractor.extract(APP), extractor.extract(APP));
    }

    #[test]
    fn test_custom_state_variable() {
        let extractor = PageGraphExtractor::new("view", "start").unwrap();
        let markup = r#"<div v-if="view === 'start'"><b @click="view = 'end'"></b></div>
            <div v-if="view === 'end'"></div>"#;
        let graph = extractor.extract(markup);
        assert_eq!(graph.pages.len(), 2);
        assert_eq!(graph.transitions[0].from, "start");
        assert_eq!(graph.transitions[0].to, "end");
    }

    #[test]
    fn test_page_labels_fall_back_to_identifier() {
        assert_eq!(page_label("home"), "首页");
        assert_eq!(page_label("wrongBookDetail"), "错题详情");
        assert_eq!(page_label("checkout"), "checkout");
    }
}
