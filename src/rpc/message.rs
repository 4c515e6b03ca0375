//! RPC wire types.
//!
//! One request type per message, discriminated by a `type` tag; one response
//! shape for everything: a success flag plus either a data payload or an
//! error message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// All store operations addressable over the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Get {
        collection: String,
        id: String,
    },
    Fetch {
        collection: String,
        id: String,
    },
    Update {
        collection: String,
        id: String,
        updates: Map<String, Value>,
    },
    Remove {
        collection: String,
        id: String,
    },
    All {
        collection: String,
    },
    Count {
        collection: String,
    },
    ClearCache,
    Flush,
}

impl Request {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Fetch { .. } => "fetch",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::All { .. } => "all",
            Self::Count { .. } => "count",
            Self::ClearCache => "clearCache",
            Self::Flush => "flush",
        }
    }
}

/// Reply to a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_discriminators() {
        let request = Request::Get {
            collection: "users".to_string(),
            id: "42".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"type": "get", "collection": "users", "id": "42"}));

        let value = serde_json::to_value(Request::ClearCache).unwrap();
        assert_eq!(value, json!({"type": "clearCache"}));
    }

    #[test]
    fn test_update_round_trip() {
        let payload = json!({
            "type": "update",
            "collection": "users",
            "id": "42",
            "updates": {"settings": {"lang": "en"}}
        });

        let request: Request = serde_json::from_value(payload).unwrap();
        match request {
            Request::Update { collection, id, updates } => {
                assert_eq!(collection, "users");
                assert_eq!(id, "42");
                assert_eq!(updates.get("settings"), Some(&json!({"lang": "en"})));
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_fails_to_decode() {
        let payload = json!({"type": "explode", "collection": "users"});
        assert!(serde_json::from_value::<Request>(payload).is_err());
    }

    #[test]
    fn test_missing_parameters_fail_to_decode() {
        let payload = json!({"type": "get", "collection": "users"});
        assert!(serde_json::from_value::<Request>(payload).is_err());
    }

    #[test]
    fn test_response_skips_absent_fields() {
        let ok = serde_json::to_value(Response::ok(json!(7))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": 7}));

        let err = serde_json::to_value(Response::err("boom")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Request::Flush.type_name(), "flush");
        assert_eq!(Request::ClearCache.type_name(), "clearCache");
    }
}
