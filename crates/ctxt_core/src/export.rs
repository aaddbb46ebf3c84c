//! crates/ctxt_core/src/export.rs
//!
//! Serializes a context stack into one of the supported export formats.
//! Rendering is pure; the use-count bump that accompanies an export is the
//! caller's job (it goes through the store).

use serde_json::json;

use crate::domain::{ContextBlock, ContextStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xml,
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Xml => "xml",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
        }
    }

    pub fn from_name(name: &str) -> Option<ExportFormat> {
        match name {
            "xml" => Some(ExportFormat::Xml),
            "json" => Some(ExportFormat::Json),
            "markdown" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Root element name for XML exports; defaults to `context`.
    pub custom_wrapper: Option<String>,
    /// When false, URL provenance (url/title) is omitted from the output.
    pub include_sources: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            custom_wrapper: None,
            include_sources: true,
        }
    }
}

/// Renders the stack in the requested format. Block order is preserved in
/// every format.
pub fn render(stack: &ContextStack, format: ExportFormat, options: &ExportOptions) -> String {
    match format {
        ExportFormat::Xml => render_xml(stack, options),
        ExportFormat::Json => render_json(stack, options),
        ExportFormat::Markdown => render_markdown(stack, options),
    }
}

// Block content is embedded verbatim, without entity escaping.
fn render_xml(stack: &ContextStack, options: &ExportOptions) -> String {
    let wrapper = options.custom_wrapper.as_deref().unwrap_or("context");
    let mut out = format!("<{wrapper}>");

    if let Some(description) = &stack.description {
        out.push_str(&format!("\n  <description>{description}</description>"));
    }

    for (i, block) in stack.blocks.iter().enumerate() {
        let n = i + 1;
        match block {
            ContextBlock::Url { url, title, content } if options.include_sources => {
                let title = title.as_deref().unwrap_or("Untitled");
                out.push_str(&format!(
                    "\n  <source_{n} url=\"{url}\" title=\"{title}\">\n    {content}\n  </source_{n}>"
                ));
            }
            ContextBlock::Url { content, .. } => {
                out.push_str(&format!("\n  <source_{n}>\n    {content}\n  </source_{n}>"));
            }
            ContextBlock::Text { content } => {
                out.push_str(&format!("\n  <text_{n}>\n    {content}\n  </text_{n}>"));
            }
        }
    }

    out.push_str(&format!("\n</{wrapper}>"));
    out
}

fn render_json(stack: &ContextStack, options: &ExportOptions) -> String {
    let blocks = if options.include_sources {
        serde_json::to_value(&stack.blocks).unwrap_or_default()
    } else {
        json!(stack
            .blocks
            .iter()
            .map(|b| json!({ "content": b.content() }))
            .collect::<Vec<_>>())
    };

    let data = json!({
        "name": stack.name,
        "description": stack.description,
        "blocks": blocks,
        "metadata": {
            "created_at": stack.created_at.to_rfc3339(),
            "use_count": stack.use_count,
            "is_template": stack.is_template,
        }
    });

    serde_json::to_string_pretty(&data).unwrap_or_default()
}

fn render_markdown(stack: &ContextStack, options: &ExportOptions) -> String {
    let mut lines: Vec<String> = vec![format!("# {}", stack.name), String::new()];

    if let Some(description) = &stack.description {
        lines.push(description.clone());
        lines.push(String::new());
    }

    for (i, block) in stack.blocks.iter().enumerate() {
        let n = i + 1;
        match block {
            ContextBlock::Url { url, title, content } if options.include_sources => {
                let title = title.as_deref().unwrap_or("Untitled");
                lines.push(format!("## Source {n}: {title}"));
                lines.push(format!("**URL:** {url}"));
                lines.push(String::new());
                lines.push(content.clone());
            }
            block => {
                lines.push(format!("## Block {n}"));
                lines.push(String::new());
                lines.push(block.content().to_string());
            }
        }
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn stack() -> ContextStack {
        ContextStack {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            name: "Research Notes".into(),
            description: Some("Links for the write-up".into()),
            blocks: vec![
                ContextBlock::Url {
                    url: "https://example.com/a".into(),
                    title: Some("First Source".into()),
                    content: "Alpha content".into(),
                },
                ContextBlock::Text {
                    content: "A free-form note".into(),
                },
                ContextBlock::Url {
                    url: "https://example.com/b".into(),
                    title: None,
                    content: "Beta content".into(),
                },
            ],
            is_template: false,
            is_public: true,
            use_count: 7,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn json_round_trips_block_order_and_content() {
        let stack = stack();
        let out = render(&stack, ExportFormat::Json, &ExportOptions::default());

        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let blocks: Vec<ContextBlock> =
            serde_json::from_value(value["blocks"].clone()).unwrap();
        assert_eq!(blocks, stack.blocks);
        assert_eq!(value["name"], "Research Notes");
        assert_eq!(value["metadata"]["use_count"], 7);
    }

    #[test]
    fn json_without_sources_reduces_url_blocks_to_content() {
        let out = render(
            &stack(),
            ExportFormat::Json,
            &ExportOptions {
                custom_wrapper: None,
                include_sources: false,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let blocks = value["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], serde_json::json!({ "content": "Alpha content" }));
        assert!(blocks[0].get("url").is_none());
    }

    #[test]
    fn xml_wraps_blocks_in_order() {
        let out = render(&stack(), ExportFormat::Xml, &ExportOptions::default());
        assert!(out.starts_with("<context>"));
        assert!(out.ends_with("</context>"));

        let src1 = out.find("<source_1 url=\"https://example.com/a\" title=\"First Source\">");
        let text2 = out.find("<text_2>");
        let src3 = out.find("<source_3 url=\"https://example.com/b\" title=\"Untitled\">");
        assert!(src1.is_some() && text2.is_some() && src3.is_some());
        assert!(src1 < text2 && text2 < src3);
        assert!(out.contains("<description>Links for the write-up</description>"));
    }

    #[test]
    fn xml_honors_custom_wrapper_and_hides_sources() {
        let out = render(
            &stack(),
            ExportFormat::Xml,
            &ExportOptions {
                custom_wrapper: Some("bundle".into()),
                include_sources: false,
            },
        );
        assert!(out.starts_with("<bundle>"));
        assert!(out.ends_with("</bundle>"));
        assert!(out.contains("<source_1>"));
        assert!(!out.contains("url=\""));
    }

    #[test]
    fn markdown_lists_sources_and_separators() {
        let out = render(&stack(), ExportFormat::Markdown, &ExportOptions::default());
        assert!(out.starts_with("# Research Notes\n"));
        assert!(out.contains("## Source 1: First Source"));
        assert!(out.contains("**URL:** https://example.com/a"));
        assert!(out.contains("## Block 2"));
        assert!(out.contains("A free-form note"));
        assert!(out.contains("## Source 3: Untitled"));
        assert_eq!(out.matches("---").count(), 3);
    }

    #[test]
    fn markdown_without_sources_uses_generic_headings() {
        let out = render(
            &stack(),
            ExportFormat::Markdown,
            &ExportOptions {
                custom_wrapper: None,
                include_sources: false,
            },
        );
        assert!(out.contains("## Block 1"));
        assert!(!out.contains("**URL:**"));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!(ExportFormat::from_name("xml"), Some(ExportFormat::Xml));
        assert_eq!(ExportFormat::from_name("json"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_name("markdown"), Some(ExportFormat::Markdown));
        assert_eq!(ExportFormat::from_name("pdf"), None);
    }
}
