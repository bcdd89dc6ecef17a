//! Parcel data model and request payloads

pub mod parcel;
pub mod payload;

pub use parcel::{
    identification_list, Identification, ModelError, ID_FIELD, IDENTIFICATION_FIELD,
    PARCEL_ID_FIELD,
};
pub use payload::{IdentificationError, Payload};
