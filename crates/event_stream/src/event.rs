use serde::Serialize;

/// The uniform client protocol every chat and workflow stream speaks.
/// Handlers translate their own internal event types (`chat_loop::ChatEvent`,
/// `migration_workflow::RunnerEvent`) into these before framing. Grounded
/// on `examples/original_source/backend/stream/data_stream.py`'s event
/// vocabulary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    #[serde(rename = "start")]
    Start { message_id: String },

    #[serde(rename = "text-start")]
    TextStart { id: String },
    #[serde(rename = "text-delta")]
    TextDelta { id: String, delta: String },
    #[serde(rename = "text-end")]
    TextEnd { id: String },

    #[serde(rename = "reasoning-start")]
    ReasoningStart { id: String },
    #[serde(rename = "reasoning-delta")]
    ReasoningDelta { id: String, delta: String },
    #[serde(rename = "reasoning-end")]
    ReasoningEnd { id: String },

    #[serde(rename = "tool-input-start")]
    ToolInputStart { id: String, tool_name: String },
    #[serde(rename = "tool-input-delta")]
    ToolInputDelta { id: String, delta: String },
    #[serde(rename = "tool-input-available")]
    ToolInputAvailable { id: String, input: serde_json::Value },
    #[serde(rename = "tool-output-available")]
    ToolOutputAvailable { id: String, output: serde_json::Value },

    #[serde(rename = "source-url")]
    SourceUrl { id: String, url: String },
    #[serde(rename = "source-document")]
    SourceDocument { id: String, title: String },
    #[serde(rename = "file")]
    File { url: String, media_type: String },

    #[serde(rename = "data-workflow-status")]
    DataWorkflowStatus { data: serde_json::Value },
    #[serde(rename = "data-supervisor-reasoning")]
    DataSupervisorReasoning { data: serde_json::Value },
    #[serde(rename = "data-human-review-required")]
    DataHumanReviewRequired { data: serde_json::Value },

    #[serde(rename = "finish")]
    Finish {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_metadata: Option<serde_json::Value>,
    },
    #[serde(rename = "error")]
    Error { error_text: String },
    #[serde(rename = "abort")]
    Abort { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_serializes_with_kebab_case_type_tag() {
        let event = StreamEvent::TextDelta {
            id: "1".to_string(),
            delta: "hi".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"text-delta\""));
        assert!(json.contains("\"delta\":\"hi\""));
    }

    #[test]
    fn finish_omits_absent_message_metadata() {
        let event = StreamEvent::Finish { message_metadata: None };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, "{\"type\":\"finish\"}");
    }
}
