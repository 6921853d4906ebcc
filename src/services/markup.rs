use crate::error::Result;
use crate::services::extractor::compile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const LISTENER_MARKER: &str = "<!-- prototype navigation listener -->";

const LISTENER_SCRIPT: &str = r#"<script>
(function() {
    window.addEventListener('message', function(event) {
        if (event.data && event.data.type === 'navigateTo') {
            var pageName = event.data.page;
            if (window.currentPage && window.currentPage.value !== undefined) {
                window.currentPage.value = pageName;
            }
            if (window.parent !== window) {
                window.parent.postMessage({ type: 'pageChange', page: pageName }, '*');
            }
        }
    });

    if (window.parent !== window) {
        setInterval(function() {
            if (window.currentPage && window.currentPage.value) {
                window.parent.postMessage({ type: 'pageChange', page: window.currentPage.value }, '*');
            }
        }, 500);
    }
})();
</script>"#;

/// Text of the first `<title>` element, trimmed.
pub fn extract_title(html: &str) -> Option<String> {
    let pattern = compile(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Prepares a prototype for embedding in the viewer: exposes the page ref on
/// `window` and installs the `postMessage` listener, replacing an earlier one.
pub fn inject_navigation_listener(html: &str, state_var: &str) -> Result<String> {
    let var = regex::escape(state_var);
    let mut content = html.to_string();

    let exposure = format!("window.{0} = {0};", state_var);
    if !content.contains(&exposure) {
        let pattern = compile(&format!(r"return\s*\{{\s*{}\b", var))?;
        if let Some(at) = pattern.find(&content).map(|m| m.start()) {
            let indent = line_indent(&content, at).to_string();
            content.insert_str(at, &format!("{}\n\n{}", exposure, indent));
            debug!("Exposed {} on window", state_var);
        } else {
            warn!("No `return {{ {}` found; viewer navigation may not work", state_var);
        }
    }

    if content.contains(LISTENER_MARKER) {
        let previous = compile(&format!(
            r"(?s){}.*?</script>\s*",
            regex::escape(LISTENER_MARKER)
        ))?;
        content = previous.replace_all(&content, "").into_owned();
    }

    let listener = format!("{}\n{}\n", LISTENER_MARKER, LISTENER_SCRIPT);
    Ok(insert_before_closing(&content, &listener))
}

fn insert_before_closing(html: &str, snippet: &str) -> String {
    for tag in ["</body>", "</html>"] {
        if let Some(at) = html.find(tag) {
            let mut content = html.to_string();
            content.insert_str(at, snippet);
            return content;
        }
    }
    format!("{}\n{}", html, snippet)
}

/// Inserts `snippet` right after the opening `<head>` tag, if there is one.
pub fn insert_after_head(html: &str, snippet: &str) -> String {
    match html.find("<head>") {
        Some(at) => {
            let mut content = html.to_string();
            content.insert_str(at + "<head>".len(), &format!("\n{}", snippet));
            content
        }
        None => html.to_string(),
    }
}

fn line_indent(content: &str, pos: usize) -> &str {
    let line_start = content[..pos].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &content[line_start..pos];
    if prefix.chars().all(char::is_whitespace) {
        prefix
    } else {
        ""
    }
}

/// Replaces `prefix/<file>` references to images in `dir` with data URIs.
pub fn embed_images_base64(html: &str, dir: &Path, prefix: &str) -> Result<String> {
    if !dir.is_dir() {
        return Ok(html.to_string());
    }

    let mut content = html.to_string();
    for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot embed image {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let data_uri = data_uri(mime_for_extension(extension), &bytes);

        for separator in ['/', '\\'] {
            content = content.replace(&format!("{}{}{}", prefix, separator, name), &data_uri);
        }
    }

    Ok(content)
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

pub fn extension_for_mime(content_type: &str) -> &'static str {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        _ => "png",
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// JSON that is safe to paste inside an inline `<script>` element.
pub fn json_for_script<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROTOTYPE: &str = "<html><head><title> Study App </title></head><body>
<script>
  createApp({
    setup() {
      const currentPage = ref('home');
      return { currentPage };
    }
  }).mount('#app');
</script>
</body></html>";

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title(PROTOTYPE).as_deref(), Some("Study App"));
        assert_eq!(extract_title("<html></html>"), None);
        assert_eq!(extract_title("<TITLE></TITLE>"), None);
    }

    #[test]
    fn test_listener_injection_is_idempotent() {
        let once = inject_navigation_listener(PROTOTYPE, "currentPage").unwrap();
        assert!(once.contains("window.currentPage = currentPage;\n\n      return { currentPage };"));
        assert!(once.contains(&format!("{}\n<script>", LISTENER_MARKER)));
        assert!(once.find(LISTENER_MARKER).unwrap() < once.find("</body>").unwrap());

        let twice = inject_navigation_listener(&once, "currentPage").unwrap();
        assert_eq!(twice.matches(LISTENER_MARKER).count(), 1);
        assert_eq!(twice.matches("window.currentPage = currentPage;").count(), 1);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_listener_without_body_tag() {
        let html = inject_navigation_listener("<div></div>", "currentPage").unwrap();
        assert!(html.starts_with("<div></div>\n"));
        assert!(html.ends_with("</script>\n"));
    }

    #[test]
    fn test_embed_images() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.png"), [1u8, 2, 3]).unwrap();
        std::fs::write(temp.path().join("b.JPG"), [4u8]).unwrap();

        let html = r#"<img src="images/a.png"><img src="images\b.JPG"><img src="other/a.png">"#;
        let embedded = embed_images_base64(html, temp.path(), "images").unwrap();

        assert!(embedded.contains(r#"src="data:image/png;base64,AQID""#));
        assert!(embedded.contains(r#"src="data:image/jpeg;base64,BA==""#));
        assert!(embedded.contains("other/a.png"));

        let missing = embed_images_base64(html, &temp.path().join("nope"), "images").unwrap();
        assert_eq!(missing, html);
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(extension_for_mime("image/jpeg; charset=binary"), "jpg");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
        assert_eq!(mime_for_extension("svg"), "image/svg+xml");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
        assert_eq!(
            json_for_script(&vec!["</script>"]).unwrap(),
            r#"["<\/script>"]"#
        );
    }

    #[test]
    fn test_insert_after_head() {
        let html = insert_after_head("<html><head><title>x</title></head></html>", "<noscript></noscript>");
        assert!(html.starts_with("<html><head>\n<noscript></noscript><title>"));
        assert_eq!(insert_after_head("<p></p>", "x"), "<p></p>");
    }
}
