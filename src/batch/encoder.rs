//! # Request Encoder
//!
//! Turns a line-delimited batch submission into provider-native batch items.
//!
//! The encoder is permissive: a line that is not a JSON object, or whose
//! request body is not an object, is skipped rather than failing the whole
//! submission. Parameters a provider cannot express are dropped by the
//! provider's [`RequestDialect`].

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    batch::model::BatchRequestItem,
    error::{EncodingFailedSnafu, InvalidRequestSnafu},
    Result,
};

/// The per-provider half of request encoding.
pub trait RequestDialect {
    /// Translates generic (OpenAI-style) parameters into the provider's native
    /// optional parameters. Anything the provider cannot express is dropped.
    fn map_params(&self, model: Option<&str>, params: Map<String, Value>) -> Map<String, Value>;

    /// Builds the wire body of one batch line.
    fn transform(
        &self,
        model: Option<&str>,
        messages: &[Value],
        params: Map<String, Value>,
    ) -> Value;
}

/// A submission line that parsed into a usable request body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based line number in the submission.
    pub line_number: usize,
    pub custom_id: Option<String>,
    pub body: Map<String, Value>,
}

impl ParsedLine {
    /// The caller-supplied `custom_id`, or `req-<line number>`.
    pub fn custom_id(&self) -> String {
        self.custom_id
            .clone()
            .unwrap_or_else(|| format!("req-{}", self.line_number))
    }
}

/// Parses every usable line of a submission, in order.
pub fn parse_lines(raw: &str) -> Vec<ParsedLine> {
    raw.lines()
        .enumerate()
        .filter_map(|(index, line)| parse_line(index + 1, line))
        .collect()
}

fn parse_line(line_number: usize, line: &str) -> Option<ParsedLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(line) else {
        debug!(line_number, "skipping batch line that is not a JSON object");
        return None;
    };

    let custom_id = match object.remove("custom_id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    let body = match object.remove("body") {
        Some(Value::Object(body)) => body,
        None | Some(Value::Null) => object,
        Some(_) => {
            debug!(line_number, "skipping batch line whose body is not an object");
            return None;
        }
    };

    Some(ParsedLine {
        line_number,
        custom_id,
        body,
    })
}

/// Encodes one parsed line with the given dialect.
pub fn encode_line<D>(line: ParsedLine, dialect: &D) -> BatchRequestItem
where
    D: RequestDialect + ?Sized,
{
    let custom_id = line.custom_id();
    let mut params = line.body;
    let model = match params.remove("model") {
        Some(Value::String(model)) => Some(model),
        _ => None,
    };
    let messages = match params.remove("messages") {
        Some(Value::Array(messages)) => messages,
        _ => Vec::new(),
    };

    let native = dialect.map_params(model.as_deref(), params);
    BatchRequestItem {
        custom_id,
        params: dialect.transform(model.as_deref(), &messages, native),
    }
}

/// Encodes a submission into provider-native items, preserving line order.
pub fn encode<D>(raw: &str, dialect: &D) -> Vec<BatchRequestItem>
where
    D: RequestDialect + ?Sized,
{
    parse_lines(raw)
        .into_iter()
        .map(|line| encode_line(line, dialect))
        .collect()
}

/// Like [`encode`], but a submission that yields nothing usable is an error.
pub fn encode_required<D>(raw: &str, dialect: &D) -> Result<Vec<BatchRequestItem>>
where
    D: RequestDialect + ?Sized,
{
    if raw.trim().is_empty() {
        return InvalidRequestSnafu {
            message: "batch input is empty",
        }
        .fail();
    }

    let items = encode(raw, dialect);
    if items.is_empty() {
        let lines = raw.lines().filter(|line| !line.trim().is_empty()).count();
        return EncodingFailedSnafu { lines }.fail();
    }
    Ok(items)
}
