use bytes::Bytes;
use serde_json::{json, Value};

/// Model name the upstream currently uses for image generation. Only the
/// default capability derivation looks at this; the forwarding core takes an
/// explicit [`ModelCapability`] so callers with better knowledge (the model
/// catalog, a config flag) are not tied to the substring.
pub const IMAGE_GENERATION_MODEL: &str = "gemini-2.0-flash-exp";

/// What the forwarder needs to know about the targeted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCapability {
    Standard,
    ImageGeneration,
}

/// Default derivation: infer the capability from the request path.
pub fn capability_for_path(path: &str) -> ModelCapability {
    if path.contains(IMAGE_GENERATION_MODEL) {
        ModelCapability::ImageGeneration
    } else {
        ModelCapability::Standard
    }
}

/// Best-effort rewrite for image-generation requests: make sure
/// `generationConfig.responseModalities` exists and includes `"Image"`.
///
/// Anything that cannot be rewritten (non-JSON body, non-object root) is
/// forwarded unmodified; the upstream gets to reject it instead of us.
pub fn ensure_image_modalities(body: &Bytes) -> Bytes {
    let mut value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, "image generation body is not json, forwarding as-is");
            return body.clone();
        }
    };

    let Some(root) = value.as_object_mut() else {
        tracing::warn!("image generation body is not a json object, forwarding as-is");
        return body.clone();
    };

    let config = root
        .entry("generationConfig")
        .or_insert_with(|| json!({}));
    let Some(config) = config.as_object_mut() else {
        return body.clone();
    };

    let has_image = config
        .get("responseModalities")
        .and_then(Value::as_array)
        .map(|modalities| modalities.iter().any(|m| m == "Image"))
        .unwrap_or(false);

    if !has_image {
        config.insert("responseModalities".to_string(), json!(["Text", "Image"]));
    }

    match serde_json::to_vec(&value) {
        Ok(rewritten) => Bytes::from(rewritten),
        Err(error) => {
            tracing::warn!(%error, "failed to re-serialize rewritten body, forwarding as-is");
            body.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(raw: &str) -> Value {
        let out = ensure_image_modalities(&Bytes::from(raw.to_string()));
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn capability_inferred_from_path() {
        assert_eq!(
            capability_for_path("/v1beta/models/gemini-2.0-flash-exp:generateContent"),
            ModelCapability::ImageGeneration
        );
        assert_eq!(
            capability_for_path("/v1beta/models/gemini-1.5-pro:generateContent"),
            ModelCapability::Standard
        );
    }

    #[test]
    fn missing_generation_config_is_created() {
        let value = rewrite(r#"{"contents":[{"parts":[{"text":"a cat"}]}]}"#);
        assert_eq!(
            value["generationConfig"]["responseModalities"],
            json!(["Text", "Image"])
        );
        assert!(value["contents"].is_array(), "rest of body untouched");
    }

    #[test]
    fn text_only_modalities_are_replaced() {
        let value = rewrite(r#"{"generationConfig":{"responseModalities":["Text"],"topK":3}}"#);
        assert_eq!(
            value["generationConfig"]["responseModalities"],
            json!(["Text", "Image"])
        );
        assert_eq!(value["generationConfig"]["topK"], 3);
    }

    #[test]
    fn existing_image_modality_is_kept_verbatim() {
        let value = rewrite(r#"{"generationConfig":{"responseModalities":["Image"]}}"#);
        assert_eq!(
            value["generationConfig"]["responseModalities"],
            json!(["Image"])
        );
    }

    #[test]
    fn non_json_body_passes_through_unchanged() {
        let body = Bytes::from_static(b"not json at all");
        assert_eq!(ensure_image_modalities(&body), body);
    }

    #[test]
    fn non_object_json_passes_through_unchanged() {
        let body = Bytes::from_static(b"[1,2,3]");
        assert_eq!(ensure_image_modalities(&body), body);
    }
}
