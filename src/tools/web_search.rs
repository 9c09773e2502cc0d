//! Web search tool backed by the DuckDuckGo instant answer API

use super::{fetch_json, parse_input, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub const NO_RESULT: &str = "No good search result found";
const MAX_RELATED_TOPICS: usize = 3;

pub struct WebSearchTool;

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
}

/// Build a text summary from an instant answer response
fn summarize(response: &Value) -> String {
    let field = |name: &str| {
        response
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let mut lines = Vec::new();
    if let Some(answer) = field("Answer") {
        lines.push(answer.to_string());
    }
    if let Some(text) = field("AbstractText") {
        match field("AbstractSource") {
            Some(source) => lines.push(format!("{text} ({source})")),
            None => lines.push(text.to_string()),
        }
    }
    if let Some(definition) = field("Definition") {
        lines.push(definition.to_string());
    }

    let mut topics = Vec::new();
    if let Some(related) = response.get("RelatedTopics").and_then(Value::as_array) {
        collect_topics(related, &mut topics);
    }
    lines.extend(topics.into_iter().take(MAX_RELATED_TOPICS));

    if lines.is_empty() {
        NO_RESULT.to_string()
    } else {
        lines.join("\n")
    }
}

/// Related topics may be grouped under `Topics`; flatten them in order
fn collect_topics(items: &[Value], out: &mut Vec<String>) {
    for item in items {
        if let Some(text) = item.get("Text").and_then(Value::as_str) {
            if !text.is_empty() {
                out.push(text.to_string());
            }
        } else if let Some(nested) = item.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, out);
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> String {
        "Search the web for current information. Input should be a search query.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: SearchInput = parse_input(input)?;
        let request = ctx.http.get(format!("{}/", ctx.config.duckduckgo_url)).query(&[
            ("q", input.query.as_str()),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);

        let response = fetch_json("DuckDuckGo", request, true).await?;
        Ok(ToolOutput::text(summarize(&response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;
    use mockito::Matcher;

    #[test]
    fn test_summarize_prefers_answer_and_abstract() {
        let response = json!({
            "Answer": "",
            "AbstractText": "Rust is a systems programming language.",
            "AbstractSource": "Wikipedia",
            "Definition": "",
            "RelatedTopics": [
                {"Text": "Cargo - package manager"},
                {"Name": "Tools", "Topics": [{"Text": "rustup"}, {"Text": "clippy"}]},
                {"Text": "crates.io"}
            ]
        });
        assert_eq!(
            summarize(&response),
            "Rust is a systems programming language. (Wikipedia)\nCargo - package manager\nrustup\nclippy"
        );
    }

    #[test]
    fn test_summarize_empty_response() {
        assert_eq!(summarize(&json!({"AbstractText": "", "RelatedTopics": []})), NO_RESULT);
    }

    #[tokio::test]
    async fn test_search_queries_provider() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "capital of france".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"Answer": "Paris", "RelatedTopics": []}"#)
            .create_async()
            .await;

        let out = WebSearchTool
            .run(json!({"query": "capital of france"}), test_context(&server.url()))
            .await
            .unwrap();

        assert_eq!(out.content, json!("Paris"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = WebSearchTool
            .run(json!({"query": "anything"}), test_context(&server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Provider { .. }));
        assert!(!err.is_recoverable());
    }
}
