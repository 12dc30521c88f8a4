use super::{BodyContext, BodyDecoder, BodyError, DecodedBody};
use serde_json::Value;

const MEDIA: &str = "text/csv";

/// `text/csv` and `*/*+csv`.
///
/// The body is validated as a string. The header row is reported as the
/// body's fields, and every record must have the header's width.
#[derive(Debug, Default)]
pub struct CsvDecoder;

impl BodyDecoder for CsvDecoder {
    fn decode(&self, body: &[u8], _ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let text = std::str::from_utf8(body).map_err(|e| BodyError::malformed(MEDIA, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(body);
        let fields = reader
            .headers()
            .map_err(|e| BodyError::malformed(MEDIA, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        for record in reader.records() {
            record.map_err(|e| BodyError::malformed(MEDIA, e))?;
        }
        Ok(DecodedBody {
            value: Value::String(text.to_string()),
            fields,
        })
    }
}
