use super::{media_essence, BodyContext, BodyDecoder, BodyError, DecodedBody};
use serde_json::Value;

/// `application/json` and `*/*+json`.
#[derive(Debug, Default)]
pub struct JsonDecoder;

impl BodyDecoder for JsonDecoder {
    fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| BodyError::malformed(&media_essence(ctx.content_type), e))?;
        Ok(DecodedBody::from_value(value))
    }
}
