//! Request/response fixtures shared across integration tests.

use gateway_core::{ChatMessage, GatewayRequest, ModelObject};
use serde_json::{json, Value};

/// A single-turn user chat request.
#[must_use]
pub fn simple_chat_request(model: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("Hello, how are you?"))
        .build()
        .expect("valid request")
}

/// A chat request with a system prompt ahead of the user turn.
#[must_use]
pub fn chat_request_with_system(model: &str, system: &str, user: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::system(system))
        .message(ChatMessage::user(user))
        .build()
        .expect("valid request")
}

/// A three-turn conversation: user, assistant, user.
#[must_use]
pub fn multi_turn_chat_request(model: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("What is 2 + 2?"))
        .message(ChatMessage::assistant("2 + 2 equals 4."))
        .message(ChatMessage::user("And what is that multiplied by 3?"))
        .build()
        .expect("valid request")
}

/// A chat request with `stream: true` set.
#[must_use]
pub fn streaming_chat_request(model: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("Tell me a short story."))
        .stream(true)
        .build()
        .expect("valid request")
}

/// A chat request with an explicit temperature/`max_tokens` pair.
#[must_use]
pub fn parameterized_chat_request(model: &str, temperature: f32, max_tokens: u32) -> GatewayRequest {
    GatewayRequest::builder()
        .model(model)
        .message(ChatMessage::user("Hello!"))
        .temperature(temperature)
        .max_tokens(max_tokens)
        .build()
        .expect("valid request")
}

/// An OpenAI-compatible JSON chat completion request body.
#[must_use]
pub fn openai_json_request(model: &str, message: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": message}],
    })
}

/// An OpenAI-compatible JSON request with every common parameter set.
#[must_use]
pub fn openai_json_request_full(model: &str, messages: Vec<Value>, temperature: f64, max_tokens: u32, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
        "stream": stream,
    })
}

/// The `/v1/models` response shape for a fixed catalog of Azure/Bedrock models.
#[must_use]
pub fn models_list_response() -> Value {
    json!({
        "object": "list",
        "data": [
            {"id": "gpt-4o", "object": "model", "created": 0, "owned_by": "azure_openai"},
            {"id": "claude-3-sonnet", "object": "model", "created": 0, "owned_by": "bedrock"},
        ]
    })
}

/// Sample `ModelObject`s matching [`models_list_response`].
#[must_use]
pub fn sample_models() -> Vec<ModelObject> {
    vec![
        ModelObject {
            id: "gpt-4o".to_string(),
            object: "model".to_string(),
            created: 0,
            owned_by: "azure_openai".to_string(),
        },
        ModelObject {
            id: "claude-3-sonnet".to_string(),
            object: "model".to_string(),
            created: 0,
            owned_by: "bedrock".to_string(),
        },
    ]
}

/// A generic OpenAI-compatible error body.
#[must_use]
pub fn error_response(error_type: &str, message: &str, code: &str) -> Value {
    json!({
        "error": {
            "type": error_type,
            "message": message,
            "code": code,
        }
    })
}

/// A rate-limit error body.
#[must_use]
pub fn rate_limit_error_response() -> Value {
    error_response(
        "rate_limit_error",
        "Rate limit exceeded. Please retry later.",
        "rate_limit_exceeded",
    )
}

/// An authentication-failure error body.
#[must_use]
pub fn auth_error_response() -> Value {
    error_response("authentication_error", "Invalid API key provided.", "invalid_api_key")
}

/// A model-not-found error body.
#[must_use]
pub fn model_not_found_error_response(model: &str) -> Value {
    error_response(
        "invalid_request_error",
        &format!("The model '{model}' does not exist"),
        "model_not_found",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::MessageRole;

    #[test]
    fn simple_chat_request_has_one_user_message() {
        let request = simple_chat_request("gpt-4o");
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 1);
        assert!(matches!(request.messages[0].role, MessageRole::User));
    }

    #[test]
    fn chat_request_with_system_orders_system_before_user() {
        let request = chat_request_with_system("gpt-4o", "You are helpful.", "Hello");
        assert_eq!(request.messages.len(), 2);
        assert!(matches!(request.messages[0].role, MessageRole::System));
        assert!(matches!(request.messages[1].role, MessageRole::User));
    }

    #[test]
    fn streaming_chat_request_sets_stream_flag() {
        let request = streaming_chat_request("gpt-4o");
        assert!(request.stream);
    }

    #[test]
    fn openai_json_request_round_trips_model_and_message() {
        let json = openai_json_request("gpt-4o", "Hello");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["content"], "Hello");
    }
}
