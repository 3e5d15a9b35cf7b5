use crate::store::{Document, VectorStore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const SEARCH_MOVIES: &str = "search_movies";

/// A tool the model can call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call made by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    fn failure(call: &ToolCall, error: String) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }

    /// Text handed back to the model
    pub fn to_message_content(&self) -> String {
        match &self.error {
            None => self.output.clone(),
            Some(error) => format!("Error: {}", error),
        }
    }
}

/// Similarity search over the indexed movies, exposed to the model.
#[derive(Clone)]
pub struct MovieSearchTool {
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl MovieSearchTool {
    pub fn new(store: Arc<dyn VectorStore>, k: usize) -> Self {
        Self { store, k: k.max(1) }
    }

    pub fn definition(&self) -> Tool {
        Tool {
            name: SEARCH_MOVIES.to_string(),
            description: "Search the movie catalogue for films matching a description of plot, \
                mood, setting or theme. Use this before recommending a movie so the suggestion \
                comes from the catalogue."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What the movie should be about (e.g., 'a melancholic space odyssey')"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub async fn call(&self, call: &ToolCall) -> ToolResult {
        if call.name != SEARCH_MOVIES {
            return ToolResult::failure(call, format!("Unknown tool: {}", call.name));
        }

        let Some(query) = call
            .arguments
            .get("query")
            .and_then(|q| q.as_str())
            .filter(|q| !q.trim().is_empty())
        else {
            return ToolResult::failure(call, "Missing required argument 'query'".to_string());
        };

        debug!(query, k = self.k, "Searching movies");
        match self.store.similarity_search(query, self.k).await {
            Ok(documents) => ToolResult {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                success: true,
                output: format_documents(&documents),
                error: None,
            },
            Err(e) => ToolResult::failure(call, e.to_string()),
        }
    }
}

/// The `title` metadata as display text, whatever JSON type it was stored as.
pub fn document_title(document: &Document) -> String {
    match document.metadata.get("title") {
        Some(serde_json::Value::String(title)) => title.clone(),
        Some(serde_json::Value::Null) | None => "Untitled".to_string(),
        Some(other) => other.to_string(),
    }
}

/// One block per movie: title line when known, then overview, then the other fields.
pub fn format_documents(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No matching movies found.".to_string();
    }

    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let title = document_title(doc);

            let details: Vec<String> = doc
                .metadata
                .iter()
                .filter(|(k, v)| k.as_str() != "title" && !v.is_null())
                .map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{}: {}", k, s),
                    None => format!("{}: {}", k, v),
                })
                .collect();

            let mut block = format!("{}. {}\n{}", i + 1, title, doc.page_content);
            if !details.is_empty() {
                block.push_str(&format!("\n({})", details.join("; ")));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Instructions describing the JSON tool-call protocol
pub fn create_tool_system_prompt(tools: &[Tool]) -> String {
    let mut prompt = String::from(
        "You have access to the following tools. When you need one, respond with ONLY a JSON \
        object in this exact format and nothing else:\n\
        {\"tool\": \"tool_name\", \"arguments\": { ... }}\n\n",
    );

    for tool in tools {
        prompt.push_str(&format!(
            "Tool: {}\nDescription: {}\nParameters: {}\n\n",
            tool.name,
            tool.description,
            serde_json::to_string_pretty(&tool.parameters).unwrap_or_default()
        ));
    }

    prompt.push_str(
        "After a tool runs you will see its result. Use it to answer the user in your own words; \
        never show raw tool output or JSON to the user.",
    );

    prompt
}

static CODE_BLOCK_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").ok());

fn tool_call_from_json(json: &serde_json::Value) -> Option<ToolCall> {
    let name = json.get("tool").and_then(|t| t.as_str())?;
    let arguments = json
        .get("arguments")
        .cloned()
        .unwrap_or(serde_json::json!({}));

    Some(ToolCall {
        id: format!("call_{}", uuid::Uuid::new_v4()),
        name: name.to_string(),
        arguments,
    })
}

/// Extract tool calls from a model reply: fenced JSON blocks first, then the
/// whole reply as bare JSON.
pub fn parse_tool_calls(response: &str) -> Vec<ToolCall> {
    let mut tool_calls = Vec::new();

    if let Some(re) = CODE_BLOCK_RE.as_ref() {
        for cap in re.captures_iter(response) {
            if let Some(json_str) = cap.get(1) {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str.as_str().trim()) {
                    tool_calls.extend(tool_call_from_json(&json));
                }
            }
        }
    }

    if tool_calls.is_empty() {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(response.trim()) {
            tool_calls.extend(tool_call_from_json(&json));
        }
    }

    tool_calls
}
