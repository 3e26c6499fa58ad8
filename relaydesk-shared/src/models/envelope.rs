use serde::{Deserialize, Serialize};

/// Standard `{ "data": ... }` wrapper around every dashboard API response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiEnvelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

impl<T> ApiEnvelope<Vec<T>> {
    /// Unwraps a list response, treating a missing `data` field as an empty list.
    pub fn into_list(self) -> Vec<T> {
        self.data.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_is_an_empty_list() {
        let envelope: ApiEnvelope<Vec<u32>> = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(envelope.into_list().is_empty());
    }

    #[test]
    fn unwraps_data() {
        let envelope: ApiEnvelope<Vec<u32>> = serde_json::from_str(r#"{"data":[1,2]}"#).unwrap();
        assert_eq!(envelope.into_list(), vec![1, 2]);
    }
}
