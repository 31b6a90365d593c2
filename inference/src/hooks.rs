//! Body (de)serialization for the hosting runtime.

use serde_json::Value;

use crate::error::TaskError;
use crate::request::RequestEnvelope;
use crate::result::TaskResult;

/// The only supported request and response media type.
pub const JSON: &str = "application/json";

/// Returns true if `content_type` is JSON, ignoring parameters such as
/// `charset` and letter case.
pub fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|media| media.eq_ignore_ascii_case(JSON))
}

/// Parses a request body into an envelope. The body must be a JSON object.
pub fn deserialize(body: &[u8], content_type: &str) -> Result<RequestEnvelope, TaskError> {
    if !is_json(content_type) {
        return Err(TaskError::UnsupportedContentType(content_type.to_string()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TaskError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(TaskError::InvalidRequest(format!(
            "request body is not valid JSON: {e}"
        ))),
    }
}

/// Renders a result in the requested media type.
pub fn serialize(result: &TaskResult, content_type: &str) -> Result<Vec<u8>, TaskError> {
    if !is_json(content_type) {
        return Err(TaskError::UnsupportedContentType(content_type.to_string()));
    }
    Ok(serde_json::to_vec(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Correlation;

    #[test]
    fn test_content_type_matching() {
        assert!(is_json("application/json"));
        assert!(is_json("Application/JSON; charset=utf-8"));
        assert!(!is_json("text/plain"));
        assert!(!is_json(""));
    }

    #[test]
    fn test_deserialize_requires_json_object() {
        let env = deserialize(br#"{"task":"get_embedding"}"#, "application/json").unwrap();
        assert_eq!(env["task"], "get_embedding");

        let err = deserialize(b"[1,2]", JSON).unwrap_err();
        assert!(matches!(err, TaskError::InvalidRequest(_)));

        let err = deserialize(b"{", JSON).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));

        let err = deserialize(b"{}", "text/csv").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported content type: text/csv");
    }

    #[test]
    fn test_serialize_result() {
        let result = TaskResult::failed(
            None,
            &Correlation::default(),
            None,
            &TaskError::MissingTask,
        );
        let body = serialize(&result, JSON).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "failed");

        assert!(serialize(&result, "application/x-npy").is_err());
    }
}
