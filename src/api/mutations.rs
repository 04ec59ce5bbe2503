//! Write descriptors.
//!
//! Each function returns a [`Mutation`] tagged with the resource whose
//! invalidation rule applies: `source`, `incident` or `source.scrape`.

use super::models::{IncidentCreate, SourceCreate};
use crate::mutation::Mutation;
use crate::transport::Request;
use crate::Result;

pub const SOURCE: &str = "source";
pub const INCIDENT: &str = "incident";
pub const SOURCE_SCRAPE: &str = "source.scrape";

pub fn create_source(source: &SourceCreate) -> Result<Mutation> {
    Ok(Mutation::new(
        "create_source",
        SOURCE,
        Request::post("/sources").json(source)?,
    ))
}

pub fn update_source(id: &str, source: &SourceCreate) -> Result<Mutation> {
    Ok(Mutation::new(
        "update_source",
        SOURCE,
        Request::put(format!("/sources/{id}")).json(source)?,
    ))
}

pub fn delete_source(id: &str) -> Mutation {
    Mutation::new("delete_source", SOURCE, Request::delete(format!("/sources/{id}")))
}

/// Ask the backend to scrape a source now. The scrape itself runs later on
/// the server, so nothing cached changes yet.
pub fn trigger_scrape(id: &str) -> Mutation {
    Mutation::new(
        "trigger_scrape",
        SOURCE_SCRAPE,
        Request::post(format!("/sources/{id}/scrape")),
    )
}

pub fn create_incident(incident: &IncidentCreate) -> Result<Mutation> {
    Ok(Mutation::new(
        "create_incident",
        INCIDENT,
        Request::post("/incidents").json(incident)?,
    ))
}

pub fn update_incident(id: &str, incident: &IncidentCreate) -> Result<Mutation> {
    Ok(Mutation::new(
        "update_incident",
        INCIDENT,
        Request::put(format!("/incidents/{id}")).json(incident)?,
    ))
}

/// Admin only; others get a 403 validation error.
pub fn delete_incident(id: &str) -> Mutation {
    Mutation::new(
        "delete_incident",
        INCIDENT,
        Request::delete(format!("/incidents/{id}")),
    )
}
