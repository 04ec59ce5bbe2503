//! Wire models of the dashboard API.
//!
//! Timestamps and ids are kept as the strings the API sends (ISO-8601 and
//! UUIDs); nothing in the sync layer needs to do arithmetic on them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Auth
// ============================================================================

/// The signed-in user, as returned by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: String,
    #[serde(default)]
    pub last_login: Option<String>,
}

/// Response of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

/// Account registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "bearer".to_string()
}

fn default_scraping_interval() -> u32 {
    3600
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::FalsePositive => "false_positive",
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(IncidentStatus::Open),
            "investigating" => Ok(IncidentStatus::Investigating),
            "resolved" => Ok(IncidentStatus::Resolved),
            "false_positive" => Ok(IncidentStatus::FalsePositive),
            other => Err(format!("unknown incident status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Forum,
    PasteSite,
    SocialMedia,
    Blog,
    Github,
    SecurityFeed,
    News,
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forum" => Ok(SourceType::Forum),
            "paste_site" => Ok(SourceType::PasteSite),
            "social_media" => Ok(SourceType::SocialMedia),
            "blog" => Ok(SourceType::Blog),
            "github" => Ok(SourceType::Github),
            "security_feed" => Ok(SourceType::SecurityFeed),
            "news" => Ok(SourceType::News),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

// ============================================================================
// Sources
// ============================================================================

/// A scraped feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_scraping_interval")]
    pub scraping_interval: u32,
    #[serde(default)]
    pub last_scraped: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Payload for creating or replacing a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCreate {
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    pub is_active: bool,
    /// Seconds between scrapes.
    pub scraping_interval: u32,
}

impl SourceCreate {
    pub fn new(name: impl Into<String>, url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            source_type,
            is_active: true,
            scraping_interval: default_scraping_interval(),
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    pub fn scraping_interval(mut self, secs: u32) -> Self {
        self.scraping_interval = secs;
        self
    }
}

// ============================================================================
// Incidents
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AptGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub origin_country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: String,
    pub name: String,
    pub sector_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A cyber incident with its resolved relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub severity: Severity,
    pub status: IncidentStatus,
    #[serde(default)]
    pub incident_date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub indicators_of_compromise: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub geographical_location: Option<String>,
    #[serde(default)]
    pub affected_systems: Vec<String>,
    #[serde(default)]
    pub mitigation_steps: Option<String>,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub apt_group_id: Option<String>,
    #[serde(default)]
    pub sector_id: Option<String>,
    pub discovered_date: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub apt_group: Option<AptGroup>,
    #[serde(default)]
    pub sector: Option<Sector>,
}

/// Payload for creating or replacing an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub severity: Severity,
    pub status: IncidentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apt_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<String>,
}

impl IncidentCreate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            severity: Severity::Medium,
            status: IncidentStatus::Open,
            url: None,
            tags: Vec::new(),
            source_id: None,
            apt_group_id: None,
            sector_id: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn status(mut self, status: IncidentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub pages: u32,
}

/// Filters for the incident listing.
///
/// Unset filters are omitted from the request, so they never split the
/// cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentQuery {
    pub page: u32,
    pub per_page: u32,
    pub severity: Vec<Severity>,
    pub status: Vec<IncidentStatus>,
    pub sector_id: Option<String>,
    pub apt_group_id: Option<String>,
    pub search: Option<String>,
}

impl Default for IncidentQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            severity: Vec::new(),
            status: Vec::new(),
            sector_id: None,
            apt_group_id: None,
            search: None,
        }
    }
}

impl IncidentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity.push(severity);
        self
    }

    pub fn status(mut self, status: IncidentStatus) -> Self {
        self.status.push(status);
        self
    }

    pub fn sector_id(mut self, id: impl Into<String>) -> Self {
        self.sector_id = Some(id.into());
        self
    }

    pub fn apt_group_id(mut self, id: impl Into<String>) -> Self {
        self.apt_group_id = Some(id.into());
        self
    }

    /// Blank search terms are treated as no search.
    pub fn search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.trim().is_empty()).then_some(search);
        self
    }
}

// ============================================================================
// Dashboard & analytics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentStats {
    pub total_incidents: u64,
    pub critical_incidents: u64,
    pub high_incidents: u64,
    pub medium_incidents: u64,
    pub low_incidents: u64,
    pub open_incidents: u64,
    pub investigating_incidents: u64,
    pub resolved_incidents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorStats {
    pub sector_name: String,
    pub incident_count: u64,
    pub critical_count: u64,
    #[serde(default)]
    pub last_incident_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AptStats {
    pub apt_name: String,
    pub incident_count: u64,
    #[serde(default)]
    pub origin_country: Option<String>,
    #[serde(default)]
    pub last_activity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatTrend {
    pub date: String,
    pub incident_count: u64,
    #[serde(default)]
    pub severity_breakdown: BTreeMap<String, u64>,
}

/// Aggregate served by `/dashboard/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub stats: IncidentStats,
    #[serde(default)]
    pub sector_stats: Vec<SectorStats>,
    #[serde(default)]
    pub apt_stats: Vec<AptStats>,
    #[serde(default)]
    pub recent_incidents: Vec<Incident>,
    #[serde(default)]
    pub threat_trends: Vec<ThreatTrend>,
}

/// Filters for `/analytics/trends`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendsQuery {
    pub days: u32,
    pub sector_id: Option<String>,
    pub severity: Option<Severity>,
}

impl Default for TrendsQuery {
    fn default() -> Self {
        Self {
            days: 30,
            sector_id: None,
            severity: None,
        }
    }
}

impl TrendsQuery {
    pub fn days(days: u32) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn sector_id(mut self, id: impl Into<String>) -> Self {
        self.sector_id = Some(id.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Plain `{"message": ...}` acknowledgement returned by deletes and
/// scrape triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
}
