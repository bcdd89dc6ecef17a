//! Parcel and identification shapes
//!
//! Parcels are free-form documents. The only fields this service reads are
//! the addressing key and the `identification` list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::Document;

/// Top-level key of a parcel body sent to `createParcel`
pub const ID_FIELD: &str = "id";
/// Key naming the target parcel in every other request
pub const PARCEL_ID_FIELD: &str = "parcelId";
/// Ordered list of identification records on a parcel
pub const IDENTIFICATION_FIELD: &str = "identification";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("parcel field `identification` is {found}, expected an array")]
    IdentificationNotArray { found: &'static str },

    #[error("identification entry {index} is {found}, expected an object")]
    IdentificationEntryNotObject { index: usize, found: &'static str },

    #[error("identification record cannot be serialized: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One identification record, owned by the parcel named in `parcel_id`.
///
/// Fields other than `parcelId` are opaque and kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    #[serde(rename = "parcelId")]
    pub parcel_id: String,
    #[serde(flatten)]
    pub fields: Document,
}

impl Identification {
    pub fn to_value(&self) -> Result<Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Current identification list of a parcel document
///
/// An absent or `null` field reads as an empty list. Anything else that is not
/// an array of objects is malformed.
pub fn identification_list(parcel: &Document) -> Result<Vec<Value>, ModelError> {
    let entries = match parcel.get(IDENTIFICATION_FIELD) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ModelError::IdentificationNotArray {
                found: json_type(other),
            })
        }
    };

    if let Some((index, entry)) = entries.iter().enumerate().find(|(_, e)| !e.is_object()) {
        return Err(ModelError::IdentificationEntryNotObject {
            index,
            found: json_type(entry),
        });
    }

    Ok(entries.clone())
}

/// JSON type name for error messages
pub const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_absent_or_null_list_is_empty() {
        assert!(identification_list(&doc(json!({"id": "p1"}))).unwrap().is_empty());
        assert!(identification_list(&doc(json!({"id": "p1", "identification": null})))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_list_keeps_order() {
        let parcel = doc(json!({
            "id": "p1",
            "identification": [{"parcelId": "p1", "n": 1}, {"parcelId": "p1", "n": 2}]
        }));
        let list = identification_list(&parcel).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["n"], 1);
        assert_eq!(list[1]["n"], 2);
    }

    #[test]
    fn test_malformed_list_is_rejected() {
        let parcel = doc(json!({"id": "p1", "identification": "scanned"}));
        assert!(matches!(
            identification_list(&parcel),
            Err(ModelError::IdentificationNotArray { found: "a string" })
        ));

        let parcel = doc(json!({"id": "p1", "identification": [{"parcelId": "p1"}, 7]}));
        assert!(matches!(
            identification_list(&parcel),
            Err(ModelError::IdentificationEntryNotObject {
                index: 1,
                found: "a number"
            })
        ));
    }

    #[test]
    fn test_identification_keeps_opaque_fields() {
        let raw = json!({"parcelId": "p1", "scanner": "dock-4", "tags": ["fragile"]});
        let ident: Identification = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(ident.parcel_id, "p1");
        assert_eq!(ident.fields["scanner"], "dock-4");
        assert_eq!(ident.to_value().unwrap(), raw);
    }

    #[test]
    fn test_encode_error_keeps_source() {
        use std::error::Error as _;

        let err = ModelError::from(serde_json::from_str::<Value>("{").unwrap_err());
        assert!(matches!(err, ModelError::Encode(_)));
        assert!(err.source().is_some());
    }
}
