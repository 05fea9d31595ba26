//! Content Router: routes message attachments by recipient capability.
//!
//! Partitions a message's attachments by whether the recipient's declared
//! capabilities can consume them: supported attachments are inlined as
//! base64; unsupported ones are rewritten into a text description (type,
//! filename, size, reference, forwarding suggestion) so the recipient still
//! learns the attachment exists even though it can't read the bytes. No
//! MIME sniffing: capability matching is purely on the declared
//! `content_type` prefix (e.g. `"image/"`) — binary-content classification is
//! explicitly out of scope.

use crate::domain::{Attachment, Payload};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What kinds of content a recipient can consume directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Content-type prefixes the recipient accepts as input (e.g. `"text"`, `"image"`).
    pub input: BTreeSet<String>,
    /// Content-type prefixes the recipient can itself produce.
    pub output: BTreeSet<String>,
}

impl Default for Capabilities {
    /// Default when a role declares no capabilities: text only.
    fn default() -> Self {
        Self {
            input: BTreeSet::from(["text".to_string()]),
            output: BTreeSet::from(["text".to_string()]),
        }
    }
}

fn content_kind(content_type: &str) -> &str {
    content_type.split('/').next().unwrap_or(content_type)
}

/// Rewrites `payload` for delivery to a recipient with the given input
/// capabilities: attachments the recipient supports are inlined as a
/// `data:` URL in their `text` field substitute; unsupported ones become a
/// textual description appended to the routed text.
#[must_use]
pub fn route_for_recipient(payload: &Payload, capabilities: &Capabilities) -> Payload {
    let mut text = payload.text.clone().unwrap_or_default();
    let mut kept_attachments = Vec::new();
    let mut unsupported = Vec::new();

    for attachment in &payload.attachments {
        let kind = content_kind(&attachment.content_type);
        if capabilities.input.contains(kind) {
            if let Some(data) = &attachment.data {
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                kept_attachments.push(Attachment {
                    content_type: attachment.content_type.clone(),
                    filename: attachment.filename.clone(),
                    size: attachment.size,
                    data: Some(data.clone()),
                    reference: attachment
                        .reference
                        .clone()
                        .or_else(|| Some(format!("data:{};base64,{encoded}", attachment.content_type))),
                });
            } else {
                kept_attachments.push(attachment.clone());
            }
        } else {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&describe_unsupported(attachment));
            unsupported.push(unsupported_attachment_entry(attachment));
        }
    }

    let structured = merge_unsupported_structured(payload.structured.clone(), unsupported);

    Payload {
        text: if text.is_empty() { None } else { Some(text) },
        structured,
        attachments: kept_attachments,
    }
}

fn describe_unsupported(attachment: &Attachment) -> String {
    let filename = attachment.filename.as_deref().unwrap_or("unnamed");
    let reference = attachment
        .reference
        .as_deref()
        .map_or_else(String::new, |r| format!(", reference: {r}"));
    format!(
        "[attachment not viewable: {} \"{}\", {} bytes{reference}. Forward the reference to an agent with matching input capabilities to view it.]",
        attachment.content_type, filename, attachment.size
    )
}

fn unsupported_attachment_entry(attachment: &Attachment) -> serde_json::Value {
    serde_json::json!({
        "content_type": attachment.content_type,
        "filename": attachment.filename,
        "size": attachment.size,
        "reference": attachment.reference,
    })
}

/// Folds `unsupported` attachment descriptions into the payload's existing
/// `structured` value under an `unsupported_attachments` array, preserving
/// whatever the sender already put in `structured`. Returns the original
/// value unchanged (including `None`) when there's nothing unsupported.
fn merge_unsupported_structured(
    existing: Option<serde_json::Value>,
    unsupported: Vec<serde_json::Value>,
) -> Option<serde_json::Value> {
    if unsupported.is_empty() {
        return existing;
    }

    let mut root = match existing {
        Some(serde_json::Value::Object(map)) => map,
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("original".to_string(), other);
            map
        }
        None => serde_json::Map::new(),
    };
    root.insert(
        "unsupported_attachments".to_string(),
        serde_json::Value::Array(unsupported),
    );
    Some(serde_json::Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_attachment() -> Attachment {
        Attachment {
            content_type: "image/png".to_string(),
            filename: Some("diagram.png".to_string()),
            size: 2048,
            data: Some(vec![1, 2, 3, 4]),
            reference: None,
        }
    }

    #[test]
    fn supported_attachment_is_inlined() {
        let payload = Payload {
            text: Some("see attached".to_string()),
            structured: None,
            attachments: vec![image_attachment()],
        };
        let caps = Capabilities {
            input: BTreeSet::from(["text".to_string(), "image".to_string()]),
            output: BTreeSet::from(["text".to_string()]),
        };
        let routed = route_for_recipient(&payload, &caps);
        assert_eq!(routed.attachments.len(), 1);
        assert!(routed.attachments[0].reference.as_ref().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn unsupported_attachment_becomes_text_description() {
        let payload = Payload {
            text: Some("see attached".to_string()),
            structured: None,
            attachments: vec![image_attachment()],
        };
        let caps = Capabilities::default();
        let routed = route_for_recipient(&payload, &caps);
        assert!(routed.attachments.is_empty());
        let text = routed.text.unwrap();
        assert!(text.contains("diagram.png"));
        assert!(text.contains("2048 bytes"));
    }

    #[test]
    fn unsupported_attachment_is_recorded_in_structured_payload() {
        let payload = Payload {
            text: Some("see attached".to_string()),
            structured: None,
            attachments: vec![image_attachment()],
        };
        let caps = Capabilities::default();
        let routed = route_for_recipient(&payload, &caps);
        let structured = routed.structured.expect("structured payload is populated");
        let entries = structured["unsupported_attachments"]
            .as_array()
            .expect("unsupported_attachments is an array");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["content_type"], "image/png");
        assert_eq!(entries[0]["filename"], "diagram.png");
        assert_eq!(entries[0]["size"], 2048);
    }

    #[test]
    fn existing_structured_payload_is_preserved_alongside_unsupported_list() {
        let payload = Payload {
            text: Some("see attached".to_string()),
            structured: Some(serde_json::json!({"kind": "report"})),
            attachments: vec![image_attachment()],
        };
        let caps = Capabilities::default();
        let routed = route_for_recipient(&payload, &caps);
        let structured = routed.structured.expect("structured payload is populated");
        assert_eq!(structured["kind"], "report");
        assert_eq!(structured["unsupported_attachments"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn default_capabilities_are_text_only() {
        let caps = Capabilities::default();
        assert!(caps.input.contains("text"));
        assert_eq!(caps.input.len(), 1);
    }
}
