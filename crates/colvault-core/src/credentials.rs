//! Caller-supplied credential parsing.
//!
//! Credentials arrive as a JSON object in a query parameter. Different SDK
//! generations name the fields differently, so each logical field is looked up
//! through an ordered alias table: aliases are tried in order, field names are
//! compared case-insensitively, and the first hit wins.

use std::fmt;

use serde_json::{Map, Value};

const ACCESS_KEY_ALIASES: &[&str] = &["accessKeyId", "accessKey"];
const SECRET_KEY_ALIASES: &[&str] = &["secretAccessKey", "secretKey"];
const SESSION_TOKEN_ALIASES: &[&str] = &["sessionToken", "token"];

/// Credentials extracted from a caller-supplied JSON document.
#[derive(Clone, PartialEq, Eq)]
pub struct ParsedCredentials {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
}

impl fmt::Debug for ParsedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ParsedCredentials {
    /// Parse a credentials JSON document.
    ///
    /// Returns `None` when the text is not a JSON object or when either the
    /// access key or the secret key is missing or empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use colvault_core::credentials::ParsedCredentials;
    ///
    /// let creds = ParsedCredentials::parse(r#"{"AccessKeyId":"ak","SecretAccessKey":"sk"}"#)
    ///     .expect("valid credentials");
    /// assert_eq!(creds.access_key, "ak");
    /// assert!(creds.session_token.is_none());
    ///
    /// assert!(ParsedCredentials::parse(r#"{"accessKey":"ak"}"#).is_none());
    /// ```
    #[must_use]
    pub fn parse(json: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(json).ok()?;
        let object = value.as_object()?;

        let access_key = lookup(object, ACCESS_KEY_ALIASES)?;
        let secret_key = lookup(object, SECRET_KEY_ALIASES)?;
        let session_token = lookup(object, SESSION_TOKEN_ALIASES);

        Some(Self {
            access_key,
            secret_key,
            session_token,
        })
    }
}

/// Find the first non-empty string field matching one of `aliases`.
fn lookup(object: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| {
        object
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(alias))
            .and_then(|(_, value)| value.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_accept_any_case_of_alias_keys() {
        for doc in [
            r#"{"AccessKeyId":"ak","SecretAccessKey":"sk"}"#,
            r#"{"accesskeyid":"ak","secretaccesskey":"sk"}"#,
            r#"{"accessKey":"ak","secretKey":"sk"}"#,
            r#"{"ACCESSKEY":"ak","SecretKey":"sk"}"#,
        ] {
            let creds = ParsedCredentials::parse(doc).expect("credentials should parse");
            assert_eq!(creds.access_key, "ak", "{doc}");
            assert_eq!(creds.secret_key, "sk", "{doc}");
        }
    }

    #[test]
    fn test_should_reject_missing_access_or_secret() {
        assert!(ParsedCredentials::parse(r#"{"secretAccessKey":"sk"}"#).is_none());
        assert!(ParsedCredentials::parse(r#"{"accessKeyId":"ak"}"#).is_none());
        assert!(ParsedCredentials::parse(r#"{"accessKeyId":"","secretAccessKey":"sk"}"#).is_none());
        assert!(ParsedCredentials::parse("{}").is_none());
    }

    #[test]
    fn test_should_reject_non_object_json() {
        assert!(ParsedCredentials::parse("not json").is_none());
        assert!(ParsedCredentials::parse(r#"["ak","sk"]"#).is_none());
        assert!(ParsedCredentials::parse("").is_none());
    }

    #[test]
    fn test_should_read_session_token_aliases() {
        let creds = ParsedCredentials::parse(
            r#"{"accessKeyId":"ak","secretAccessKey":"sk","SessionToken":"tok"}"#,
        )
        .expect("credentials should parse");
        assert_eq!(creds.session_token.as_deref(), Some("tok"));

        let creds =
            ParsedCredentials::parse(r#"{"accessKeyId":"ak","secretAccessKey":"sk","token":"t2"}"#)
                .expect("credentials should parse");
        assert_eq!(creds.session_token.as_deref(), Some("t2"));
    }

    #[test]
    fn test_should_prefer_earlier_alias() {
        let creds = ParsedCredentials::parse(
            r#"{"accessKey":"second","accessKeyId":"first","secretKey":"sk"}"#,
        )
        .expect("credentials should parse");
        assert_eq!(creds.access_key, "first");
    }

    #[test]
    fn test_should_redact_secrets_in_debug_output() {
        let creds = ParsedCredentials::parse(
            r#"{"accessKeyId":"ak","secretAccessKey":"hunter2","sessionToken":"tok"}"#,
        )
        .expect("credentials should parse");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("\"tok\""));
    }
}
