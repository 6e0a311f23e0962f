//! OpenAI-style chat parameters to Anthropic Messages parameters.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::batch::encoder::RequestDialect;

/// Used when a line sets neither `max_tokens` nor `max_completion_tokens`;
/// the Messages API requires one.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Marks `tool_choice: "none"` until the request body is assembled.
const TOOL_CHOICE_NONE: &str = "none";

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicDialect;

impl RequestDialect for AnthropicDialect {
    fn map_params(&self, _model: Option<&str>, params: Map<String, Value>) -> Map<String, Value> {
        let mut native = Map::new();
        let mut disable_parallel = false;

        for (key, value) in params {
            match key.as_str() {
                "max_tokens" | "max_completion_tokens" if value.is_u64() => {
                    native.insert("max_tokens".into(), value);
                }
                "temperature" | "top_p" | "top_k" if value.is_number() => {
                    native.insert(key.clone(), value);
                }
                "stop" => {
                    let stops = stop_sequences(value);
                    if !stops.is_empty() {
                        native.insert("stop_sequences".into(), json!(stops));
                    }
                }
                "tools" => {
                    let tools = convert_tools(value);
                    if !tools.is_empty() {
                        native.insert("tools".into(), Value::Array(tools));
                    }
                }
                "tool_choice" => match convert_tool_choice(&value) {
                    Some(choice) => {
                        native.insert("tool_choice".into(), choice);
                    }
                    None => debug!(?value, "dropping unrecognized tool_choice"),
                },
                "parallel_tool_calls" => disable_parallel = value == Value::Bool(false),
                "user" => {
                    if let Value::String(user) = value {
                        native.insert("metadata".into(), json!({ "user_id": user }));
                    }
                }
                _ => debug!(param = %key, "dropping parameter anthropic batches do not support"),
            }
        }

        native
            .entry("max_tokens")
            .or_insert_with(|| json!(DEFAULT_MAX_TOKENS));

        if native.get("tool_choice").and_then(Value::as_str) == Some(TOOL_CHOICE_NONE) {
            native.remove("tool_choice");
            native.remove("tools");
        } else if disable_parallel && native.contains_key("tools") {
            let choice = native
                .entry("tool_choice")
                .or_insert_with(|| json!({ "type": "auto" }));
            if let Some(choice) = choice.as_object_mut() {
                choice.insert("disable_parallel_tool_use".into(), Value::Bool(true));
            }
        }
        native
    }

    fn transform(
        &self,
        model: Option<&str>,
        messages: &[Value],
        params: Map<String, Value>,
    ) -> Value {
        let (system, messages) = convert_messages(messages);

        let mut body = Map::new();
        if let Some(model) = model {
            body.insert("model".into(), json!(model));
        }
        body.insert("messages".into(), Value::Array(messages));
        if !system.is_empty() {
            body.insert("system".into(), json!(system.join("\n")));
        }
        body.extend(params);
        Value::Object(body)
    }
}

fn stop_sequences(value: Value) -> Vec<String> {
    match value {
        Value::String(stop) if !stop.is_empty() => vec![stop],
        Value::Array(stops) => stops
            .into_iter()
            .filter_map(|stop| match stop {
                Value::String(stop) if !stop.is_empty() => Some(stop),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn convert_tools(value: Value) -> Vec<Value> {
    let Value::Array(tools) = value else {
        return Vec::new();
    };
    tools
        .into_iter()
        .filter_map(|tool| {
            let function = tool.get("function")?;
            let name = function.get("name")?.as_str()?;
            let mut native = json!({
                "name": name,
                "input_schema": function
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
            });
            if let Some(description) = function.get("description").and_then(Value::as_str) {
                native["description"] = json!(description);
            }
            Some(native)
        })
        .collect()
}

fn convert_tool_choice(value: &Value) -> Option<Value> {
    match value {
        Value::String(choice) => match choice.as_str() {
            "auto" => Some(json!({ "type": "auto" })),
            "required" => Some(json!({ "type": "any" })),
            TOOL_CHOICE_NONE => Some(json!(TOOL_CHOICE_NONE)),
            _ => None,
        },
        Value::Object(choice) => {
            let name = choice.get("function")?.get("name")?.as_str()?;
            Some(json!({ "type": "tool", "name": name }))
        }
        _ => None,
    }
}

/// Splits system prompts out of the conversation and converts the rest into
/// Anthropic content blocks, merging consecutive messages of the same role.
fn convert_messages(messages: &[Value]) -> (Vec<String>, Vec<Value>) {
    let mut system = Vec::new();
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let content = message.get("content").unwrap_or(&NULL);

        let (role, blocks) = match role {
            "system" | "developer" => {
                let text = plain_text(content);
                if !text.is_empty() {
                    system.push(text);
                }
                continue;
            }
            "user" => ("user", content_blocks(content)),
            "assistant" => {
                let mut blocks = content_blocks(content);
                blocks.extend(tool_use_blocks(message.get("tool_calls")));
                ("assistant", blocks)
            }
            "tool" | "function" => {
                let tool_use_id = message
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": plain_text(content),
                });
                ("user", vec![block])
            }
            other => {
                debug!(role = other, "dropping message with unsupported role");
                continue;
            }
        };

        if blocks.is_empty() {
            continue;
        }
        match turns.last_mut() {
            Some((last, content)) if *last == role => content.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }

    let messages = turns
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect();
    (system, messages)
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

fn content_blocks(content: &Value) -> Vec<Value> {
    match content {
        Value::String(text) if !text.is_empty() => vec![json!({ "type": "text", "text": text })],
        Value::Array(parts) => parts.iter().filter_map(content_block).collect(),
        _ => Vec::new(),
    }
}

fn content_block(part: &Value) -> Option<Value> {
    match part.get("type").and_then(Value::as_str)? {
        "text" => {
            let text = part.get("text")?.as_str()?;
            (!text.is_empty()).then(|| json!({ "type": "text", "text": text }))
        }
        "image_url" => {
            let image = part.get("image_url")?;
            let url = image.get("url").unwrap_or(image).as_str()?;
            Some(image_block(url))
        }
        other => {
            debug!(part = other, "dropping unsupported content part");
            None
        }
    }
}

fn image_block(url: &str) -> Value {
    if let Some((media_type, data)) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
    {
        return json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data },
        });
    }
    json!({ "type": "image", "source": { "type": "url", "url": url } })
}

fn tool_use_blocks(tool_calls: Option<&Value>) -> Vec<Value> {
    let Some(Value::Array(calls)) = tool_calls else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            let input = match function.get("arguments") {
                Some(Value::String(arguments)) => {
                    serde_json::from_str(arguments).unwrap_or_else(|_| json!({}))
                }
                Some(Value::Object(arguments)) => Value::Object(arguments.clone()),
                _ => json!({}),
            };
            Some(json!({
                "type": "tool_use",
                "id": call.get("id").and_then(Value::as_str).unwrap_or_default(),
                "name": function.get("name")?.as_str()?,
                "input": input,
            }))
        })
        .collect()
}
