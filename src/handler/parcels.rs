//! Parcel request handlers
//!
//! Each handler validates its identifying field, makes one read and/or one
//! write against the store, and returns a [`Reply`]. Handlers keep no state
//! between calls.
//!
//! `save_identification` is a plain read-modify-write of the whole
//! `identification` list with no compare-and-set, so two concurrent appends
//! to the same parcel can lose one record (last writer wins).

use serde_json::Value;

use super::error::{HandlerError, Reply};
use crate::logger;
use crate::model::{
    identification_list, IdentificationError, Payload, ID_FIELD, IDENTIFICATION_FIELD,
    PARCEL_ID_FIELD,
};
use crate::store::{Document, DocumentStore, StoreError};

pub type HandlerResult = Result<Reply, HandlerError>;

const MISSING_PARCEL_ID: &str = "Missing parcelId";
const PARCEL_NOT_FOUND: &str = "Parcel not found";

/// The five parcel routes, each mounted at `/<name>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelRoute {
    SaveIdentification,
    LoadParcel,
    CreateParcel,
    UpdateParcel,
    DeleteParcel,
}

impl ParcelRoute {
    pub const ALL: [Self; 5] = [
        Self::SaveIdentification,
        Self::LoadParcel,
        Self::CreateParcel,
        Self::UpdateParcel,
        Self::DeleteParcel,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::SaveIdentification => "saveIdentification",
            Self::LoadParcel => "loadParcel",
            Self::CreateParcel => "createParcel",
            Self::UpdateParcel => "updateParcel",
            Self::DeleteParcel => "deleteParcel",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.strip_prefix('/')?;
        Self::ALL.into_iter().find(|route| route.name() == name)
    }
}

/// Run the handler for `route`
pub async fn dispatch(route: ParcelRoute, store: &dyn DocumentStore, payload: Payload) -> HandlerResult {
    logger::log_handler(route.name());
    match route {
        ParcelRoute::SaveIdentification => save_identification(store, payload).await,
        ParcelRoute::LoadParcel => load_parcel(store, &payload).await,
        ParcelRoute::CreateParcel => create_parcel(store, payload).await,
        ParcelRoute::UpdateParcel => update_parcel(store, payload).await,
        ParcelRoute::DeleteParcel => delete_parcel(store, &payload).await,
    }
}

/// Append `identification` to its parcel's identification list
pub async fn save_identification(store: &dyn DocumentStore, payload: Payload) -> HandlerResult {
    const CONTEXT: &str = "Error saving identification";

    let record = payload.identification_record().map_err(|e| match e {
        IdentificationError::Missing => HandlerError::InvalidInput("Missing identification"),
        IdentificationError::MissingParcelId => HandlerError::InvalidInput(MISSING_PARCEL_ID),
    })?;

    let parcel = store
        .get(&record.parcel_id)
        .await
        .map_err(|e| HandlerError::internal(CONTEXT, e))?
        .ok_or(HandlerError::NotFound(PARCEL_NOT_FOUND))?;

    if parcel.is_empty() {
        return Err(HandlerError::NotFound("Parcel data not found"));
    }

    let mut identifications =
        identification_list(&parcel).map_err(|e| HandlerError::internal(CONTEXT, e))?;
    identifications.push(record.to_value().map_err(|e| HandlerError::internal(CONTEXT, e))?);

    let mut fields = Document::new();
    fields.insert(IDENTIFICATION_FIELD.to_string(), Value::Array(identifications));
    store
        .update(&record.parcel_id, fields)
        .await
        .map_err(|e| store_write_error(CONTEXT, e))?;

    Ok(Reply::Text("Identification saved"))
}

/// Return the full parcel document
pub async fn load_parcel(store: &dyn DocumentStore, payload: &Payload) -> HandlerResult {
    let parcel_id = payload
        .id_field(PARCEL_ID_FIELD)
        .ok_or(HandlerError::InvalidInput(MISSING_PARCEL_ID))?;

    store
        .get(parcel_id)
        .await
        .map_err(|e| HandlerError::internal("Error loading parcel", e))?
        .map(Reply::Json)
        .ok_or(HandlerError::NotFound(PARCEL_NOT_FOUND))
}

/// Write the whole body as the parcel stored under its `id`, replacing any
/// existing parcel with that id
pub async fn create_parcel(store: &dyn DocumentStore, payload: Payload) -> HandlerResult {
    let id = payload
        .id_field(ID_FIELD)
        .ok_or(HandlerError::InvalidInput("Missing parcel ID"))?
        .to_string();

    store
        .set(&id, payload.into_document())
        .await
        .map_err(|e| HandlerError::internal("Error creating parcel", e))?;

    Ok(Reply::Text("Parcel created"))
}

/// Shallow-merge the body into an existing parcel
///
/// The body is the update set as sent, so `parcelId` itself is written onto
/// the parcel. Only `id` is dropped: it is the parcel's key and never changes.
pub async fn update_parcel(store: &dyn DocumentStore, payload: Payload) -> HandlerResult {
    const CONTEXT: &str = "Error updating parcel";

    let parcel_id = payload
        .id_field(PARCEL_ID_FIELD)
        .ok_or(HandlerError::InvalidInput(MISSING_PARCEL_ID))?
        .to_string();

    let mut fields = payload.into_document();
    if fields.remove(ID_FIELD).is_some() {
        logger::log_warning(&format!(
            "updateParcel: ignoring `id` in update set for parcel {parcel_id}"
        ));
    }

    store
        .update(&parcel_id, fields)
        .await
        .map_err(|e| store_write_error(CONTEXT, e))?;

    Ok(Reply::Text("Parcel updated"))
}

/// Delete a parcel; deleting an absent parcel also succeeds
pub async fn delete_parcel(store: &dyn DocumentStore, payload: &Payload) -> HandlerResult {
    let parcel_id = payload
        .id_field(PARCEL_ID_FIELD)
        .ok_or(HandlerError::InvalidInput(MISSING_PARCEL_ID))?;

    store
        .delete(parcel_id)
        .await
        .map_err(|e| HandlerError::internal("Error deleting parcel", e))?;

    Ok(Reply::Text("Parcel deleted"))
}

/// A merge-update on a parcel that no longer exists is a 404, not a fault
fn store_write_error(context: &'static str, err: StoreError) -> HandlerError {
    match err {
        StoreError::NotFound { .. } => HandlerError::NotFound(PARCEL_NOT_FOUND),
        other => HandlerError::internal(context, other),
    }
}
