//! Decoding of the agent responses into verdicts and answers.

use serde_json::Value;

use super::{AssistantReply, ValidatorError, ValidatorResult, Verdict};

/// Bot replies containing one of these markers count as a pass.
const PASS_MARKERS: [&str; 3] = ["通过", "正确", "完美"];
/// Feedback used when the agent passes a verdict without any explanation.
const DEFAULT_FEEDBACK: &str = "Validation complete";
/// Answer used when the assistant stream carried no answer text.
const EMPTY_ANSWER: &str = "Sorry, I can't answer this question right now.";
/// Continuation lines tried when a `data:` payload spans several lines.
const MAX_CONTINUATION_LINES: usize = 10;

fn has_content(value: &Value) -> bool {
    match value.get("content") {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

/// Find the first event of a workflow stream that carries a `content` field.
fn find_content_event(body: &str) -> Option<Value> {
    let lines: Vec<&str> = body.split('\n').collect();

    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if !payload.contains("\"content\"") {
            continue;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(event) if has_content(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => {
                let mut joined = payload.to_owned();
                for next in lines.iter().skip(index + 1).take(MAX_CONTINUATION_LINES) {
                    joined.push('\n');
                    joined.push_str(next);
                    if let Ok(event) = serde_json::from_str::<Value>(&joined) {
                        if has_content(&event) {
                            return Some(event);
                        }
                        break;
                    }
                }
            }
        }
    }

    None
}

fn first_text<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
}

fn score_of(object: &Value) -> Option<f64> {
    match object.get("score")? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Extract the verdict carried by a workflow event stream.
///
/// The `content` field of the first matching event holds the verdict, either as
/// an object or as a JSON-encoded string.
pub fn parse_workflow_stream(body: &str) -> ValidatorResult<Verdict> {
    let event = find_content_event(body).ok_or_else(|| ValidatorError::Malformed {
        reason: "no content event in workflow stream".to_owned(),
    })?;

    let content = match event.get("content") {
        Some(Value::String(text)) => {
            serde_json::from_str::<Value>(text).map_err(|err| ValidatorError::Malformed {
                reason: format!("content is not JSON: {err}"),
            })?
        }
        Some(other) => other.clone(),
        None => Value::Null,
    };

    if !content.is_object() {
        return Err(ValidatorError::Malformed {
            reason: "content is not an object".to_owned(),
        });
    }

    let passed = [content.get("pass"), content.get("passed")]
        .into_iter()
        .flatten()
        .any(|flag| flag.as_bool() == Some(true));

    Ok(Verdict {
        passed,
        feedback: first_text(&content, &["reason", "feedback", "message"])
            .unwrap_or(DEFAULT_FEEDBACK)
            .to_owned(),
        score: score_of(&content),
        long_content: first_text(&content, &["long_content", "longContent"]).map(str::to_owned),
    })
}

/// Grade a non-streaming bot chat reply by looking for pass markers.
pub fn parse_bot_reply(body: &Value) -> Verdict {
    let reply = body
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| {
            messages
                .iter()
                .find(|message| message.get("role").and_then(Value::as_str) == Some("assistant"))
        })
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let passed = PASS_MARKERS.iter().any(|marker| reply.contains(marker));
    let feedback = if reply.is_empty() {
        DEFAULT_FEEDBACK
    } else {
        reply
    };

    Verdict {
        passed,
        feedback: feedback.to_owned(),
        score: None,
        long_content: None,
    }
}

fn answer_piece(event: &Value) -> Option<&str> {
    if event.get("type").and_then(Value::as_str) == Some("answer") {
        return event.get("content").and_then(Value::as_str);
    }
    None
}

/// Concatenate the answer pieces of an assistant chat stream.
///
/// `conversation_id` is kept unless the stream announces one; lines that are not
/// JSON are ignored.
pub fn parse_assistant_stream(body: &str, conversation_id: Option<String>) -> AssistantReply {
    let mut conversation_id = conversation_id;
    let mut answer = String::new();

    for line in body.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            continue;
        };

        if let Some(id) = event
            .get("conversation_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        {
            conversation_id = Some(id.to_owned());
        }
        if let Some(piece) = answer_piece(&event) {
            answer.push_str(piece);
        }
        if let Some(piece) = event.get("message").and_then(answer_piece) {
            answer.push_str(piece);
        }
    }

    if answer.is_empty() {
        answer = EMPTY_ANSWER.to_owned();
    }

    AssistantReply {
        answer,
        conversation_id,
    }
}
