//! Identifier and address types shared by the call, registry and service layers

use serde::{Deserialize, Serialize};

use crate::error::{TelecomError, TelecomResult};

/// Call ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(format!("call-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifies a provider backend (the process that owns a call's signaling)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProviderId(pub String);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An account registered by a provider. Calls are placed "through" an account.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountHandle {
    /// Provider that registered the account
    pub provider: ProviderId,
    /// Provider-scoped account id
    pub id: String,
}

impl AccountHandle {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: ProviderId(provider.into()),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for AccountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

/// Scheme used for plain telephone numbers
pub const SCHEME_TEL: &str = "tel";

/// Character that suspends post-dial playback until continued
pub const DTMF_WAIT: char = ';';

/// Character that pauses post-dial playback for a fixed interval
pub const DTMF_PAUSE: char = ',';

/// Dialed address of a call, e.g. `tel:+1 555 0100`
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Address {
    scheme: String,
    number: String,
}

impl Address {
    pub fn new(scheme: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            number: number.into(),
        }
    }

    /// Telephone-number address
    pub fn tel(number: impl Into<String>) -> Self {
        Self::new(SCHEME_TEL, number)
    }

    /// Parse `scheme:number`
    pub fn parse(s: &str) -> TelecomResult<Self> {
        match s.split_once(':') {
            Some((scheme, number)) if !scheme.is_empty() => Ok(Self::new(scheme, number)),
            _ => Err(TelecomError::invalid_state(format!(
                "address '{}' has no scheme",
                s
            ))),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    /// Number reduced to dialable digits. A leading `+` survives and keypad
    /// letters map to their digit.
    pub fn normalized_number(&self) -> String {
        let mut out = String::with_capacity(self.number.len());
        for c in self.number.chars() {
            if let Some(d) = c.to_digit(10) {
                out.push(char::from(b'0' + d as u8));
            } else if out.is_empty() && c == '+' {
                out.push(c);
            } else if let Some(d) = keypad_digit(c) {
                out.push(d);
            }
        }
        out
    }

    /// Two addresses refer to the same party: same scheme and same normalized number
    pub fn matches(&self, other: &Address) -> bool {
        self.scheme == other.scheme && self.normalized_number() == other.normalized_number()
    }

    /// Numbers containing `#` may be MMI codes handled by the provider
    pub fn is_potential_mmi_code(&self) -> bool {
        self.number.contains('#')
    }

    /// Short codes that can be dialed while other calls are in progress
    pub fn is_potential_in_call_mmi_code(&self) -> bool {
        if self.scheme != SCHEME_TEL {
            return false;
        }
        let n = self.number.as_str();
        n == "0"
            || (n.starts_with('1') && n.len() <= 2)
            || (n.starts_with('2') && n.len() <= 2)
            || n == "3"
            || n == "4"
            || n == "5"
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scheme, self.number)
    }
}

fn keypad_digit(c: char) -> Option<char> {
    let d = match c.to_ascii_lowercase() {
        'a' | 'b' | 'c' => '2',
        'd' | 'e' | 'f' => '3',
        'g' | 'h' | 'i' => '4',
        'j' | 'k' | 'l' => '5',
        'm' | 'n' | 'o' => '6',
        'p' | 'q' | 'r' | 's' => '7',
        't' | 'u' | 'v' => '8',
        'w' | 'x' | 'y' | 'z' => '9',
        _ => return None,
    };
    Some(d)
}

/// Dialpad keys that produce a DTMF tone
pub fn is_twelve_key(c: char) -> bool {
    c.is_ascii_digit() || c == '*' || c == '#'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_strips_formatting() {
        let a = Address::tel("+1 (555) 010-0200");
        assert_eq!(a.normalized_number(), "+15550100200");
    }

    #[test]
    fn test_keypad_letters_map_to_digits() {
        let a = Address::tel("1-800-FLOWERS");
        assert_eq!(a.normalized_number(), "18003569377");
    }

    #[test]
    fn test_matches_requires_same_scheme() {
        let tel = Address::tel("555-0100");
        let sip = Address::new("sip", "5550100");
        assert!(tel.matches(&Address::tel("5550100")));
        assert!(!tel.matches(&sip));
    }

    #[test]
    fn test_parse() {
        let a = Address::parse("tel:911").unwrap();
        assert_eq!(a.scheme(), "tel");
        assert_eq!(a.number(), "911");
        assert!(Address::parse("911").is_err());
    }

    #[test]
    fn test_in_call_mmi_codes() {
        assert!(Address::tel("0").is_potential_in_call_mmi_code());
        assert!(Address::tel("12").is_potential_in_call_mmi_code());
        assert!(!Address::tel("123").is_potential_in_call_mmi_code());
        assert!(!Address::new("sip", "1").is_potential_in_call_mmi_code());
        assert!(Address::tel("*#06#").is_potential_mmi_code());
    }
}
