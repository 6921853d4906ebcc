use crate::error::{PrototypeError, Result};
use crate::services::extractor::compile;
use crate::types::RouteEntry;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

pub const ROOT_FILENAME: &str = "home";

/// Parses the `const routes = [ … ];` table of a Vue Router app.
pub struct RouteTableParser {
    declaration_pattern: Regex,
    table_pattern: Regex,
    entry_pattern: Regex,
}

impl RouteTableParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            declaration_pattern: compile(r"const\s+routes\s*=\s*\[")?,
            table_pattern: compile(r"(?s)const\s+routes\s*=\s*\[(.*?)\];")?,
            entry_pattern: compile(
                r#"path:\s*['"]([^'"]+)['"]\s*,?\s*component:\s*([A-Za-z_$][\w$]*)"#,
            )?,
        })
    }

    /// Whether the markup looks like a router app at all.
    pub fn is_router_app(&self, markup: &str) -> bool {
        markup.contains("createRouter") || self.declaration_pattern.is_match(markup)
    }

    /// Ordered route entries. Fails when the table is missing, empty, or
    /// two routes derive the same output filename.
    pub fn parse(&self, markup: &str) -> Result<Vec<RouteEntry>> {
        let table = self
            .table_pattern
            .captures(markup)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| PrototypeError::RouterTable {
                reason: "no `const routes = [...];` declaration found".to_string(),
            })?;

        let mut routes = Vec::new();
        let mut claimed: HashMap<String, String> = HashMap::new();

        for caps in self.entry_pattern.captures_iter(table.as_str()) {
            let path = caps[1].to_string();
            let component = caps[2].to_string();
            let filename = route_filename(&path);

            if let Some(first) = claimed.get(&filename) {
                return Err(PrototypeError::RouteCollision {
                    filename,
                    first: first.clone(),
                    second: path,
                });
            }
            claimed.insert(filename.clone(), path.clone());

            debug!("Route {} -> {} ({}.html)", path, component, filename);
            routes.push(RouteEntry {
                path,
                component,
                filename,
            });
        }

        if routes.is_empty() {
            return Err(PrototypeError::RouterTable {
                reason: "route table contains no `path: ..., component: ...` entries".to_string(),
            });
        }

        Ok(routes)
    }
}

/// Output file stem for a route path: `/` is `home`, otherwise the path
/// without surrounding slashes and with inner slashes turned into hyphens.
pub fn route_filename(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path == "/" || path.is_empty() {
        return ROOT_FILENAME.to_string();
    }
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return ROOT_FILENAME.to_string();
    }
    trimmed.replace('/', "-")
}
