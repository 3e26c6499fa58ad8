use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A customer the agent talks to; one contact is one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<Timestamp>,
    #[serde(default)]
    pub is_bot_active: bool,
}

impl Contact {
    /// Name when known, phone number otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.phone_number)
    }

    /// Whether a push payload addressed by contact id or phone number belongs here.
    #[must_use]
    pub fn matches(&self, contact_id: Option<&str>, phone_number: Option<&str>) -> bool {
        contact_id.is_some_and(|id| id == self.id)
            || phone_number.is_some_and(|phone| phone == self.phone_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBotRequest {
    pub is_bot_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact {
            id: "c1".into(),
            phone_number: "+34600111222".into(),
            name: None,
            notes: None,
            last_interaction: None,
            is_bot_active: true,
        }
    }

    #[test]
    fn matches_by_either_identity() {
        let contact = contact();
        assert!(contact.matches(Some("c1"), None));
        assert!(contact.matches(None, Some("+34600111222")));
        assert!(contact.matches(Some("other"), Some("+34600111222")));
        assert!(!contact.matches(Some("other"), None));
        assert!(!contact.matches(None, None));
    }

    #[test]
    fn display_name_falls_back_to_phone() {
        let mut contact = contact();
        assert_eq!(contact.display_name(), "+34600111222");
        contact.name = Some("Ana".into());
        assert_eq!(contact.display_name(), "Ana");
    }
}
