//! OpenAI-style chat parameters to Gemini `generateContent` request lines.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use super::model::{
    Blob, Content, FileData, FunctionCall, FunctionCallingConfig, FunctionCallingMode,
    FunctionDeclaration, FunctionResponse, GenerateContentRequest, GenerationConfig, Part, Role,
    Tool, ToolConfig,
};
use crate::batch::encoder::RequestDialect;

#[derive(Debug, Clone, Copy, Default)]
pub struct VertexDialect;

impl RequestDialect for VertexDialect {
    fn map_params(&self, _model: Option<&str>, params: Map<String, Value>) -> Map<String, Value> {
        let mut config = GenerationConfig::default();
        let mut tools = Vec::new();
        let mut tool_config = None;

        for (key, value) in params {
            match key.as_str() {
                "temperature" => config.temperature = value.as_f64(),
                "top_p" => config.top_p = value.as_f64(),
                "top_k" => config.top_k = as_u32(&value),
                "max_tokens" | "max_completion_tokens" => config.max_output_tokens = as_u32(&value),
                "n" => config.candidate_count = as_u32(&value),
                "seed" => config.seed = value.as_i64(),
                "presence_penalty" => config.presence_penalty = value.as_f64(),
                "frequency_penalty" => config.frequency_penalty = value.as_f64(),
                "stop" => {
                    config.stop_sequences = match value {
                        Value::String(stop) => Some(vec![stop]),
                        Value::Array(stops) => Some(
                            stops
                                .into_iter()
                                .filter_map(|stop| stop.as_str().map(str::to_string))
                                .collect(),
                        ),
                        _ => None,
                    }
                }
                "response_format" => apply_response_format(&mut config, &value),
                "tools" => tools = function_declarations(&value),
                "tool_choice" => tool_config = convert_tool_choice(&value),
                _ => debug!(param = %key, "dropping parameter vertex batches do not support"),
            }
        }

        let mut native = Map::new();
        if !config.is_empty() {
            insert(&mut native, "generationConfig", &config);
        }
        if !tools.is_empty() {
            insert(
                &mut native,
                "tools",
                &[Tool {
                    function_declarations: tools,
                }],
            );
        }
        if let Some(tool_config) = tool_config {
            insert(&mut native, "toolConfig", &tool_config);
        }
        native
    }

    fn transform(
        &self,
        _model: Option<&str>,
        messages: &[Value],
        params: Map<String, Value>,
    ) -> Value {
        let (system, contents) = convert_messages(messages);
        let request = GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content::text(system.join("\n"))),
            ..Default::default()
        };

        let mut body = match serde_json::to_value(&request) {
            Ok(Value::Object(body)) => body,
            _ => Map::new(),
        };
        body.extend(params);
        Value::Object(body)
    }
}

fn insert<T: Serialize + ?Sized>(map: &mut Map<String, Value>, key: &str, value: &T) {
    if let Ok(value) = serde_json::to_value(value) {
        map.insert(key.to_string(), value);
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

fn apply_response_format(config: &mut GenerationConfig, format: &Value) {
    match format.get("type").and_then(Value::as_str) {
        Some("json_object") => {
            config.response_mime_type = Some(mime::APPLICATION_JSON.to_string());
        }
        Some("json_schema") => {
            config.response_mime_type = Some(mime::APPLICATION_JSON.to_string());
            config.response_schema = format.pointer("/json_schema/schema").cloned();
        }
        _ => {}
    }
}

fn function_declarations(tools: &Value) -> Vec<FunctionDeclaration> {
    let Some(tools) = tools.as_array() else {
        return Vec::new();
    };
    tools
        .iter()
        .filter_map(|tool| {
            let function = tool.get("function")?;
            Some(FunctionDeclaration {
                name: function.get("name")?.as_str()?.to_string(),
                description: function
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                parameters: function.get("parameters").cloned(),
            })
        })
        .collect()
}

fn convert_tool_choice(choice: &Value) -> Option<ToolConfig> {
    let (mode, allowed) = match choice {
        Value::String(choice) => match choice.as_str() {
            "auto" => (FunctionCallingMode::Auto, None),
            "required" => (FunctionCallingMode::Any, None),
            "none" => (FunctionCallingMode::None, None),
            _ => return None,
        },
        Value::Object(_) => {
            let name = choice.pointer("/function/name")?.as_str()?;
            (FunctionCallingMode::Any, Some(vec![name.to_string()]))
        }
        _ => return None,
    };
    Some(ToolConfig {
        function_calling_config: Some(FunctionCallingConfig {
            mode,
            allowed_function_names: allowed,
        }),
    })
}

fn convert_messages(messages: &[Value]) -> (Vec<String>, Vec<Content>) {
    let mut system = Vec::new();
    let mut contents: Vec<Content> = Vec::new();
    // tool messages only carry the call id; Gemini wants the function name
    let mut call_names: HashMap<String, String> = HashMap::new();

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let content = message.get("content");

        let (role, parts) = match role {
            "system" | "developer" => {
                if let Some(text) = content.map(plain_text).filter(|t| !t.is_empty()) {
                    system.push(text);
                }
                continue;
            }
            "user" => (Role::User, content.map(content_parts).unwrap_or_default()),
            "assistant" => {
                let mut parts = content.map(content_parts).unwrap_or_default();
                for call in message
                    .get("tool_calls")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                {
                    if let Some(part) = function_call_part(call, &mut call_names) {
                        parts.push(part);
                    }
                }
                (Role::Model, parts)
            }
            "tool" | "function" => {
                let name = message
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .and_then(|id| call_names.get(id).cloned())
                    .or_else(|| message.get("name").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_default();
                let text = content.map(plain_text).unwrap_or_default();
                let response = serde_json::from_str::<Value>(&text)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| serde_json::json!({ "content": text }));
                let part = Part::FunctionResponse {
                    function_response: FunctionResponse { name, response },
                };
                (Role::User, vec![part])
            }
            other => {
                debug!(role = other, "dropping message with unsupported role");
                continue;
            }
        };

        if parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some(last) if last.role == Some(role) => last.parts.extend(parts),
            _ => contents.push(Content::new(role, parts)),
        }
    }
    (system, contents)
}

fn plain_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn content_parts(content: &Value) -> Vec<Part> {
    match content {
        Value::String(text) if !text.is_empty() => vec![Part::text(text.as_str())],
        Value::Array(parts) => parts.iter().filter_map(content_part).collect(),
        _ => Vec::new(),
    }
}

fn content_part(part: &Value) -> Option<Part> {
    match part.get("type").and_then(Value::as_str)? {
        "text" => {
            let text = part.get("text")?.as_str()?;
            (!text.is_empty()).then(|| Part::text(text))
        }
        "image_url" => {
            let image = part.get("image_url")?;
            let url = image.get("url").unwrap_or(image).as_str()?;
            Some(media_part(url))
        }
        other => {
            debug!(part = other, "dropping unsupported content part");
            None
        }
    }
}

/// Data URLs become inline blobs; anything else is passed by URI.
fn media_part(url: &str) -> Part {
    if let Some((header, data)) = url.strip_prefix("data:").and_then(|r| r.split_once(',')) {
        let (mime_type, data) = match header.strip_suffix(";base64") {
            Some(mime_type) => (mime_type, data.to_string()),
            None => (header, STANDARD.encode(data)),
        };
        let mime_type = if mime_type.is_empty() {
            mime::TEXT_PLAIN.to_string()
        } else {
            mime_type.to_string()
        };
        return Part::InlineData {
            inline_data: Blob { mime_type, data },
        };
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    Part::FileData {
        file_data: FileData {
            mime_type: mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string(),
            file_uri: url.to_string(),
        },
    }
}

fn function_call_part(call: &Value, call_names: &mut HashMap<String, String>) -> Option<Part> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let args = match function.get("arguments") {
        Some(Value::String(arguments)) => {
            serde_json::from_str(arguments).unwrap_or_else(|_| Value::Object(Map::new()))
        }
        Some(Value::Object(arguments)) => Value::Object(arguments.clone()),
        _ => Value::Object(Map::new()),
    };
    if let Some(id) = call.get("id").and_then(Value::as_str) {
        call_names.insert(id.to_string(), name.clone());
    }
    Some(Part::FunctionCall {
        function_call: FunctionCall { name, args },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn maps_generation_config() {
        let native = VertexDialect.map_params(
            None,
            params(json!({
                "temperature": 0.5,
                "top_p": 0.8,
                "max_tokens": 100,
                "n": 2,
                "stop": ["\n\n"],
                "seed": 7,
                "response_format": {"type": "json_schema", "json_schema": {"schema": {"type": "object"}}},
                "logit_bias": {"50256": -100},
            })),
        );
        assert_eq!(
            Value::Object(native),
            json!({
                "generationConfig": {
                    "temperature": 0.5,
                    "topP": 0.8,
                    "maxOutputTokens": 100,
                    "candidateCount": 2,
                    "stopSequences": ["\n\n"],
                    "seed": 7,
                    "responseMimeType": "application/json",
                    "responseSchema": {"type": "object"},
                }
            })
        );
    }

    #[test]
    fn maps_tools_and_named_tool_choice() {
        let native = VertexDialect.map_params(
            None,
            params(json!({
                "tools": [{"type": "function", "function": {"name": "lookup", "parameters": {"type": "object"}}}],
                "tool_choice": {"type": "function", "function": {"name": "lookup"}},
            })),
        );
        assert_eq!(native["tools"][0]["functionDeclarations"][0]["name"], "lookup");
        assert_eq!(
            native["toolConfig"],
            json!({"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["lookup"]}})
        );
        assert!(!native.contains_key("generationConfig"));
    }

    #[test]
    fn converts_conversation_to_contents() {
        let messages = [
            json!({"role": "system", "content": [{"type": "text", "text": "Answer in French."}]}),
            json!({"role": "user", "content": [
                {"type": "text", "text": "Describe"},
                {"type": "image_url", "image_url": {"url": "gs://bkt/cat.png"}},
                {"type": "image_url", "image_url": "data:image/jpeg;base64,/9j/4A"},
            ]}),
            json!({"role": "assistant", "tool_calls": [{
                "id": "call_9",
                "type": "function",
                "function": {"name": "lookup", "arguments": "{\"q\":\"cat\"}"},
            }]}),
            json!({"role": "tool", "tool_call_id": "call_9", "content": "a small feline"}),
        ];
        let body = VertexDialect.transform(None, &messages, Map::new());

        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "Answer in French."}]})
        );
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(
            contents[0]["parts"][1],
            json!({"fileData": {"mimeType": "image/png", "fileUri": "gs://bkt/cat.png"}})
        );
        assert_eq!(
            contents[0]["parts"][2],
            json!({"inlineData": {"mimeType": "image/jpeg", "data": "/9j/4A"}})
        );
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"], json!({"q": "cat"}));
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"],
            json!({"name": "lookup", "response": {"content": "a small feline"}})
        );
    }

    #[test]
    fn plain_data_urls_are_base64_encoded() {
        let part = media_part("data:text/plain,hello");
        assert_eq!(
            part,
            Part::InlineData {
                inline_data: Blob {
                    mime_type: "text/plain".into(),
                    data: "aGVsbG8=".into(),
                }
            }
        );
    }
}
