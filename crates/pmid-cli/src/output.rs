//! Output formatting for CLI results
//!
//! - Table: human-readable tables (default)
//! - JSON: structured JSON for scripting
//! - Quiet: exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use pmid_proto::Envelope;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Consistent JSON wrapper for command results.
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
    pub command: String,
}

/// What the CLI knows about one stored identity.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityInfo {
    pub user_id: String,
    pub wallet_type: String,
    /// Hex of the 64-byte public key (signing || key agreement)
    pub public_key: String,
    pub fingerprint: String,
    pub created_at: u64,
    pub active: bool,
}

/// Decoded envelope, with binary fields rendered as hex.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeSummary {
    pub kind: String,
    pub fields: Vec<(String, String)>,
}

impl From<&Envelope> for EnvelopeSummary {
    fn from(envelope: &Envelope) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| fields.push((k.to_string(), v));

        match envelope {
            Envelope::Chat(m) => {
                push("id", m.id.clone());
                push("sender_user_id", m.sender_user_id.clone());
                push("recipient_user_id", m.recipient_user_id.clone());
                push("content_type", m.content_type.clone());
                push("content_len", m.encrypted_content.len().to_string());
                push("timestamp", format_time(m.timestamp));
                push("nonce", hex::encode(&m.nonce));
                push("signature", hex::encode(&m.signature));
                if let Some(a) = &m.attachment {
                    push("attachment", format!("{} ({}, {} bytes)", a.file_name, a.mime_type, a.file_size));
                    push("attachment_ref", a.content_address.clone());
                }
                if let Some(r) = &m.reply_to_id {
                    push("reply_to_id", r.clone());
                }
            }
            Envelope::Handshake(h) => {
                push("user_id", h.user_id.clone());
                push("wallet_type", h.wallet_type.to_string());
                push("public_key", hex::encode(&h.public_key));
                push("timestamp", format_time(h.timestamp));
                push("signature", hex::encode(&h.signature));
            }
            Envelope::KeyRotation(r) => {
                push("user_id", r.user_id.clone());
                push("sequence_number", r.sequence_number.to_string());
                push("nonce", r.nonce.clone());
                push("old_public_key", hex::encode(&r.old_public_key));
                push("new_public_key", hex::encode(&r.new_public_key));
                push("timestamp", format_time(r.timestamp));
            }
            Envelope::Typing(t) => {
                push("user_id", t.user_id.clone());
                push("conversation_id", t.conversation_id.clone());
                push("is_typing", t.is_typing.to_string());
                push("timestamp", format_time(t.timestamp));
            }
        }

        Self {
            kind: envelope.kind().to_string(),
            fields,
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn format_identity(&self, info: &IdentityInfo, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["User ID", info.user_id.as_str()]);
                table.add_row(vec!["Wallet Type", info.wallet_type.as_str()]);
                table.add_row(vec!["Fingerprint", info.fingerprint.as_str()]);
                if self.verbose {
                    table.add_row(vec!["Public Key", info.public_key.as_str()]);
                }
                table.add_row(vec!["Created At", &format_time(info.created_at)]);
                table.add_row(vec!["Active", if info.active { "yes" } else { "no" }]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(info, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_envelope(&self, summary: &EnvelopeSummary) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Field", summary.kind.as_str()]);
                for (k, v) in &summary.fields {
                    table.add_row(vec![k.as_str(), v.as_str()]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(summary, "inspect"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_success<T: Serialize>(&self, data: &T, command: &str) -> String {
        match self.format {
            OutputFormat::Json => self.to_json_response(data, command),
            OutputFormat::Table | OutputFormat::Quiet => String::new(),
        }
    }

    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Table => eprintln!("✗ {message}"),
            OutputFormat::Json => println!("{}", self.error_json(message)),
            OutputFormat::Quiet => {}
        }
    }

    /// Only shown with `--verbose`.
    pub fn info(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            println!("ℹ {message}");
        }
    }

    fn error_json(&self, message: &str) -> String {
        let response = JsonResponse::<()> {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: String::new(),
        };
        serde_json::to_string_pretty(&response).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        let response = JsonResponse {
            success: true,
            data: Some(value),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        };
        serde_json::to_string_pretty(&response).unwrap_or_else(|e| self.error_json(&format!("Serialization error: {e}")))
    }
}

fn format_time(unix_secs: u64) -> String {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmid_proto::TypingIndicator;

    fn info() -> IdentityInfo {
        IdentityInfo {
            user_id: "u1".into(),
            wallet_type: "temp".into(),
            public_key: "00".repeat(64),
            fingerprint: "abcd".into(),
            created_at: 1_700_000_000,
            active: true,
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_identity_json_is_wrapped() {
        let out = OutputFormatter::new(OutputFormat::Json, false).format_identity(&info(), "identity show");
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["command"], "identity show");
        assert_eq!(value["data"]["user_id"], "u1");
    }

    #[test]
    fn test_quiet_prints_nothing() {
        let out = OutputFormatter::new(OutputFormat::Quiet, true).format_identity(&info(), "identity show");
        assert!(out.is_empty());
    }

    #[test]
    fn test_table_hides_public_key_unless_verbose() {
        let terse = OutputFormatter::new(OutputFormat::Table, false).format_identity(&info(), "x");
        let verbose = OutputFormatter::new(OutputFormat::Table, true).format_identity(&info(), "x");
        assert!(!terse.contains("Public Key"));
        assert!(verbose.contains("Public Key"));
        assert!(terse.contains("2023-11-14"));
    }

    #[test]
    fn test_envelope_summary() {
        let env = Envelope::Typing(TypingIndicator {
            user_id: "u1".into(),
            conversation_id: "c1".into(),
            is_typing: true,
            timestamp: 1,
        });
        let summary = EnvelopeSummary::from(&env);
        assert_eq!(summary.kind, "typing");
        assert!(summary.fields.contains(&("is_typing".to_string(), "true".to_string())));
    }
}
