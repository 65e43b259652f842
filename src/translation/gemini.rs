use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{BatchTranslator, TranslateFuture};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiTranslator {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct BatchItem<'a> {
    index: usize,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchReply {
    index: usize,
    translation: String,
}

impl BatchTranslator for GeminiTranslator {
    fn translate_batch(&self, texts: Vec<String>, target_lang: &str) -> TranslateFuture {
        let client = self.client.clone();
        let key = self.key.clone();
        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let body = request_body(&texts, target_lang);
        let expected = texts.len();
        Box::pin(async move {
            if expected == 0 {
                return Ok(Vec::new());
            }
            let response = client
                .post(&url)
                .header("x-goog-api-key", key)
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "Gemini API error ({}): {}",
                    status,
                    extract_gemini_error(&text).unwrap_or(text)
                ));
            }
            parse_translations(&extract_reply_text(&text)?, expected)
        })
    }
}

fn request_body(texts: &[String], target_lang: &str) -> Value {
    let items = texts
        .iter()
        .enumerate()
        .map(|(index, text)| BatchItem { index, text })
        .collect::<Vec<_>>();
    let instruction = format!(
        "You translate text recognized on a scanned page into the language '{}'. \
         The input is a JSON array of {{\"index\", \"text\"}} objects. Reply with only a JSON \
         array of {{\"index\", \"translation\"}} objects, one for every input index. Keep \
         line breaks; translate nothing else.",
        target_lang
    );
    json!({
        "systemInstruction": {"parts": [{"text": instruction}]},
        "contents": [{
            "role": "user",
            "parts": [{"text": serde_json::to_string(&items).unwrap_or_default()}]
        }],
        "generationConfig": {"responseMimeType": "application/json"}
    })
}

fn extract_reply_text(body: &str) -> Result<String> {
    let payload: GeminiResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let content = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;
    let text = content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();
    if text.trim().is_empty() {
        return Err(anyhow!("Gemini returned an empty reply"));
    }
    Ok(text)
}

/// Reorders the model's reply into input order. A reply that skips any
/// index fails the whole batch.
fn parse_translations(reply: &str, expected: usize) -> Result<Vec<String>> {
    let replies: Vec<BatchReply> = serde_json::from_str(strip_code_fence(reply))
        .map_err(|err| anyhow!("translation reply is not a JSON array: {}", err))?;
    let mut slots: Vec<Option<String>> = vec![None; expected];
    for reply in replies {
        let slot = slots
            .get_mut(reply.index)
            .ok_or_else(|| anyhow!("translation reply has unknown index {}", reply.index))?;
        *slot = Some(reply.translation);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| anyhow!("no translation returned for item {}", index)))
        .collect()
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(status) = error.status
        && !status.trim().is_empty()
    {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixture_reply_in_input_order() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/gemini_translation_response.json"
        ));
        let reply = extract_reply_text(payload).expect("reply");
        let translations = parse_translations(&reply, 2).expect("translations");
        assert_eq!(translations, vec!["Hello".to_string(), "World".to_string()]);
    }

    #[test]
    fn code_fences_are_ignored() {
        let reply = "```json\n[{\"index\": 0, \"translation\": \"Bonjour\"}]\n```";
        assert_eq!(
            parse_translations(reply, 1).expect("translations"),
            vec!["Bonjour".to_string()]
        );
        assert_eq!(strip_code_fence("  [1] "), "[1]");
    }

    #[test]
    fn missing_or_unknown_indices_fail_the_batch() {
        let reply = r#"[{"index": 0, "translation": "a"}]"#;
        assert!(parse_translations(reply, 2).is_err());
        let reply = r#"[{"index": 0, "translation": "a"}, {"index": 5, "translation": "b"}]"#;
        assert!(parse_translations(reply, 1).is_err());
        assert!(parse_translations("not json", 1).is_err());
    }

    #[test]
    fn request_lists_every_text_with_its_index() {
        let body = request_body(&["你好".to_string(), "世界".to_string()], "en");
        let user = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .expect("user text");
        let items: Value = serde_json::from_str(user).expect("items");
        assert_eq!(items[1]["index"], 1);
        assert_eq!(items[1]["text"], "世界");
        let instruction = body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .expect("instruction");
        assert!(instruction.contains("'en'"));
    }

    #[test]
    fn formats_api_errors() {
        let body = r#"{"error": {"code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            extract_gemini_error(body).as_deref(),
            Some("quota | type: RESOURCE_EXHAUSTED | code: 429")
        );
        assert!(extract_gemini_error("<html>").is_none());
    }
}
