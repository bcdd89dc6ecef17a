// Request payload extraction
// Turns a raw request body into the fields each handler asks for

use serde_json::Value;

use super::parcel::{Identification, IDENTIFICATION_FIELD, PARCEL_ID_FIELD};
use crate::store::Document;

/// Parsed JSON request body
///
/// Bodies that are not a JSON object parse to an empty payload, so every
/// handler reports its own missing-field error for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(Document);

impl Payload {
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Self(fields),
            _ => Self::default(),
        }
    }

    /// Non-empty string value of `field`
    pub fn id_field(&self, field: &str) -> Option<&str> {
        match self.0.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// The `identification` object, if present
    pub fn identification(&self) -> Option<&Document> {
        self.0.get(IDENTIFICATION_FIELD).and_then(Value::as_object)
    }

    /// The `identification` record, once its `parcelId` is known to be usable
    pub fn identification_record(&self) -> Result<Identification, IdentificationError> {
        let record = self
            .identification()
            .ok_or(IdentificationError::Missing)?;
        let parcel_id = match record.get(PARCEL_ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(IdentificationError::MissingParcelId),
        };

        let mut fields = record.clone();
        fields.remove(PARCEL_ID_FIELD);
        Ok(Identification { parcel_id, fields })
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentificationError {
    Missing,
    MissingParcelId,
}
