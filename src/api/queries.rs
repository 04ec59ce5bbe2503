//! Read descriptors.
//!
//! Cache resources follow the request path: `incidents`,
//! `incidents/{id}`, `incidents/search/full-text`, `sources`,
//! `sources/{id}`, `dashboard/...`, `analytics/...`. Invalidating the prefix
//! `incidents` therefore covers listings, details and searches alike.

use super::Query;
use super::models::{
    DashboardData, Identity, Incident, IncidentQuery, Page, Source, TrendsQuery,
};
use crate::transport::Request;

/// The signed-in user.
pub fn me() -> Query<Identity> {
    Query::new(Request::get("/auth/me"))
}

/// Paginated, filtered incident listing.
pub fn incidents(query: &IncidentQuery) -> Query<Page<Incident>> {
    let severity: Vec<String> = query.severity.iter().map(|s| s.as_str().to_string()).collect();
    let status: Vec<String> = query.status.iter().map(|s| s.as_str().to_string()).collect();
    Query::new(
        Request::get("/incidents")
            .query("page", query.page)
            .query("per_page", query.per_page)
            .opt_query("severity", (!severity.is_empty()).then_some(severity))
            .opt_query("status", (!status.is_empty()).then_some(status))
            .opt_query("sector_id", query.sector_id.clone())
            .opt_query("apt_group_id", query.apt_group_id.clone())
            .opt_query("search", query.search.clone()),
    )
}

pub fn incident(id: &str) -> Query<Incident> {
    Query::new(Request::get(format!("/incidents/{id}")))
}

/// Full-text search over incidents. The API requires at least three
/// characters.
pub fn search_incidents(text: &str, page: u32, per_page: u32) -> Query<Page<Incident>> {
    Query::new(
        Request::get("/incidents/search/full-text")
            .query("query", text)
            .query("page", page)
            .query("per_page", per_page),
    )
}

pub fn sources() -> Query<Vec<Source>> {
    Query::new(Request::get("/sources"))
}

pub fn source(id: &str) -> Query<Source> {
    Query::new(Request::get(format!("/sources/{id}")))
}

pub fn dashboard() -> Query<DashboardData> {
    Query::new(Request::get("/dashboard/stats"))
}

pub fn recent_incidents(limit: u32) -> Query<Vec<Incident>> {
    Query::new(Request::get("/dashboard/recent-incidents").query("limit", limit))
}

/// Incident counts over time.
///
/// The analytics endpoints return free-form aggregates, so they stay as
/// JSON values.
pub fn trends(query: &TrendsQuery) -> Query<serde_json::Value> {
    Query::new(
        Request::get("/analytics/trends")
            .query("days", query.days)
            .opt_query("sector_id", query.sector_id.clone())
            .opt_query("severity", query.severity.map(|s| s.as_str())),
    )
}

pub fn apt_activity(days: u32) -> Query<serde_json::Value> {
    analytics("apt-activity", days)
}

pub fn sector_analysis(days: u32) -> Query<serde_json::Value> {
    analytics("sector-analysis", days)
}

pub fn threat_intelligence(days: u32) -> Query<serde_json::Value> {
    analytics("threat-intelligence", days)
}

pub fn geographic_distribution(days: u32) -> Query<serde_json::Value> {
    analytics("geographic-distribution", days)
}

fn analytics(endpoint: &str, days: u32) -> Query<serde_json::Value> {
    Query::new(Request::get(format!("/analytics/{endpoint}")).query("days", days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Severity;
    use crate::cache::CacheKey;

    #[test]
    fn incidents_key_omits_unset_filters() {
        let query = incidents(&IncidentQuery::new());
        assert_eq!(
            *query.key(),
            CacheKey::new("incidents").param("page", 1u32).param("per_page", 10u32)
        );
    }

    #[test]
    fn incidents_key_includes_filters() {
        let query = incidents(
            &IncidentQuery::new()
                .page(2)
                .severity(Severity::High)
                .severity(Severity::Critical)
                .search("ransomware"),
        );
        let key = query.key();
        assert_eq!(key.resource(), "incidents");
        assert_eq!(
            key.get("severity"),
            Some(&vec!["high".to_string(), "critical".to_string()].into())
        );
        assert_eq!(key.get("search"), Some(&"ransomware".into()));
        assert_eq!(key.get("page"), Some(&2u32.into()));
    }

    #[test]
    fn detail_keys_nest_under_listing() {
        assert!(incident("42").key().has_prefix("incidents"));
        assert!(source("7").key().has_prefix("sources"));
        assert!(search_incidents("apt28", 1, 10).key().has_prefix("incidents"));
        assert!(trends(&TrendsQuery::default()).key().has_prefix("analytics"));
        assert!(dashboard().key().has_prefix("dashboard"));
    }
}
