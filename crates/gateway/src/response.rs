use serde::{Deserialize, Serialize};

/// JSON body returned by `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClassifyResponse {
    Error {
        message: String,
    },
    Invalid {
        confidence: f64,
        audio: String,
    },
    Success {
        label: String,
        confidence: f64,
        audio: String,
    },
}

impl ClassifyResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ClassifyResponse::Error {
            message: message.into(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ClassifyResponse::Error { .. } => "error",
            ClassifyResponse::Invalid { .. } => "invalid",
            ClassifyResponse::Success { .. } => "success",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_wire_format() {
        let response = ClassifyResponse::Success {
            label: "50000".to_string(),
            confidence: 92.0,
            audio: "/static/audio/audio_1_abc.mp3".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "status": "success",
                "label": "50000",
                "confidence": 92.0,
                "audio": "/static/audio/audio_1_abc.mp3"
            })
        );
    }

    #[test]
    fn test_invalid_wire_format_has_no_label() {
        let response = ClassifyResponse::Invalid {
            confidence: 59.0,
            audio: "/static/audio/audio_invalid_1_abc.mp3".to_string(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "invalid");
        assert_eq!(value["confidence"], 59.0);
        assert!(value.get("label").is_none());
    }

    #[test]
    fn test_error_wire_format() {
        let value = serde_json::to_value(ClassifyResponse::error("No image uploaded")).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "No image uploaded"}));
        assert_eq!(ClassifyResponse::error("x").status(), "error");
    }
}
