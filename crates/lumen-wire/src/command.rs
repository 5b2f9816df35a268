//! Inbound command decoding
//!
//! A cloud-to-device command arrives either as the bare command name
//! (`ResetDevice`) or as a JSON envelope naming it:
//! `{"Name":"ResetDevice","Parameters":{}}`.

use lumen_core::{LumenError, LumenResult};
use serde::Deserialize;
use serde_json::Value;

/// A decoded command
#[derive(Clone, Debug, PartialEq)]
pub struct CommandInvocation {
    /// Command name, matched exactly (case-sensitive) against the action table
    pub name: String,
    /// Parameters from the envelope form, `Null` for bare names
    pub parameters: Value,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Parameters", default)]
    parameters: Value,
}

impl CommandInvocation {
    /// Decode command text
    pub fn decode(text: &str) -> LumenResult<Self> {
        if text.trim_start().starts_with('{') {
            let envelope: Envelope = serde_json::from_str(text)
                .map_err(|e| LumenError::InvalidCommand(e.to_string()))?;
            return Ok(CommandInvocation {
                name: envelope.name,
                parameters: envelope.parameters,
            });
        }

        Ok(CommandInvocation {
            name: text.to_string(),
            parameters: Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bare_name_is_exact() {
        let cmd = CommandInvocation::decode("ResetDevice").unwrap();
        assert_eq!(cmd.name, "ResetDevice");
        assert_eq!(cmd.parameters, Value::Null);

        // No trimming or case folding
        assert_eq!(CommandInvocation::decode(" ResetDevice").unwrap().name, " ResetDevice");
        assert_eq!(CommandInvocation::decode("resetdevice").unwrap().name, "resetdevice");
    }

    #[test]
    fn test_envelope_form() {
        let cmd = CommandInvocation::decode(r#"{"Name":"ResetDevice","Parameters":{"delay":1}}"#).unwrap();
        assert_eq!(cmd.name, "ResetDevice");
        assert_eq!(cmd.parameters["delay"], 1);

        let bare = CommandInvocation::decode(r#"{"Name":"ResetDevice"}"#).unwrap();
        assert_eq!(bare.parameters, Value::Null);
    }

    #[test]
    fn test_broken_envelope() {
        assert!(matches!(
            CommandInvocation::decode("{\"Name\":"),
            Err(LumenError::InvalidCommand(_))
        ));
        assert!(CommandInvocation::decode(r#"{"Parameters":{}}"#).is_err());
    }

    proptest! {
        #[test]
        fn prop_bare_text_decodes_to_itself(text in "[A-Za-z0-9_][A-Za-z0-9_ .:-]{0,40}") {
            let cmd = CommandInvocation::decode(&text).unwrap();
            prop_assert_eq!(cmd.name, text);
        }
    }
}
