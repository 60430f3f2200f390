use serde::Deserialize;
use serde_json::Value;

const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<Value>,
}

/// Pulls `choices[0].message.content` out of a success body.
pub fn extract_answer(body: &str) -> Result<String, String> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|err| format!("body is not a completion: {err}"))?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "response has no choices".to_owned())?
        .message
        .and_then(|message| message.content)
        .ok_or_else(|| "first choice has no message content".to_owned())?;

    match content {
        Value::String(text) if !text.trim().is_empty() => Ok(text),
        Value::String(_) => Err("message content is empty".to_owned()),
        other => Err(format!("message content is not text: {other}")),
    }
}

/// Best short description of an error body: its `error` or `message` field, else the raw text.
pub fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["error", "message"].iter().find_map(|key| match value.get(*key)? {
            Value::String(text) => Some(text.clone()),
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
    });

    let detail = from_json.unwrap_or_else(|| body.trim().to_owned());
    if detail.chars().count() > MAX_DETAIL_CHARS {
        let short: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{short}...")
    } else {
        detail
    }
}
