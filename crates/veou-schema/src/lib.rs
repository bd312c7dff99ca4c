use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const METERS_PER_MILE: f64 = 1_609.344;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }
}

/// Square search region expressed as a center plus a span in degrees
/// (applied to both latitude and longitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub center: Coordinate,
    pub span_degrees: f64,
}

impl Region {
    pub const fn new(center: Coordinate, span_degrees: f64) -> Self {
        Self {
            center,
            span_degrees,
        }
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        let half = self.span_degrees / 2.0;
        (coordinate.latitude - self.center.latitude).abs() <= half
            && (coordinate.longitude - self.center.longitude).abs() <= half
    }

    /// Approximate radius in meters covered by half the latitude span.
    pub fn radius_meters(&self) -> f64 {
        let edge = Coordinate::new(
            self.center.latitude + self.span_degrees / 2.0,
            self.center.longitude,
        );
        self.center.distance_to(&edge)
    }
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Human-readable distance: whole meters below one kilometer, otherwise
/// kilometers with one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{}m", meters as i64)
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

/// One entry in a suggestion list shown under the search box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSuggestion {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    /// Absent for autocomplete-only results until a detail lookup resolves them.
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
    #[serde(default)]
    pub is_popular: bool,
    /// Distance from the user in meters.
    #[serde(default)]
    pub distance: Option<f64>,
}

impl SearchSuggestion {
    /// Autocomplete result without coordinates; the id is title + subtitle.
    pub fn from_completion(
        title: impl Into<String>,
        subtitle: impl Into<String>,
        is_popular: bool,
    ) -> Self {
        let title = title.into();
        let subtitle = subtitle.into();
        Self {
            id: format!("{title}{subtitle}"),
            title,
            subtitle,
            coordinates: None,
            is_popular,
            distance: None,
        }
    }

    /// Resolved nearby place; the id embeds the coordinate so that two
    /// places sharing a name stay distinct.
    pub fn nearby(
        name: impl Into<String>,
        subtitle: impl Into<String>,
        coordinate: Coordinate,
        origin: &Coordinate,
    ) -> Self {
        let title = name.into();
        Self {
            id: format!(
                "{}-{}-{}",
                title, coordinate.latitude, coordinate.longitude
            ),
            title,
            subtitle: subtitle.into(),
            coordinates: Some(coordinate),
            is_popular: true,
            distance: Some(origin.distance_to(&coordinate)),
        }
    }

    /// Case-insensitive substring match on title or subtitle.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.subtitle.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

impl CrowdLevel {
    /// Numeric rating on the 1–5 scale used by review cards.
    pub fn rating(self) -> f64 {
        match self {
            CrowdLevel::Low => 1.5,
            CrowdLevel::Medium => 3.2,
            CrowdLevel::High => 4.5,
        }
    }
}

/// A pin on the map. Identity is the `id`, never the coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceAnnotation {
    pub id: Uuid,
    pub coordinate: Coordinate,
    pub title: String,
    pub subtitle: String,
    /// 0–5
    pub rating: f64,
    pub review_count: u32,
    pub crowd_level: CrowdLevel,
    /// Miles from the user.
    #[serde(default)]
    pub distance: Option<f64>,
}

impl PlaceAnnotation {
    pub fn new(coordinate: Coordinate, title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinate,
            title: title.into(),
            subtitle: subtitle.into(),
            rating: 0.0,
            review_count: 0,
            crowd_level: CrowdLevel::Medium,
            distance: None,
        }
    }

    pub fn with_rating(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = rating.clamp(0.0, 5.0);
        self.review_count = review_count;
        self
    }

    pub fn with_crowd_level(mut self, crowd_level: CrowdLevel) -> Self {
        self.crowd_level = crowd_level;
        self
    }

    pub fn with_distance_from(mut self, origin: &Coordinate) -> Self {
        self.distance = Some(meters_to_miles(origin.distance_to(&self.coordinate)));
        self
    }
}

impl PartialEq for PlaceAnnotation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlaceAnnotation {}

impl Hash for PlaceAnnotation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub username: String,
    pub time_of_day: TimeOfDay,
    /// 1–5
    pub safety_rating: u8,
    /// 1–5
    pub crowd_rating: u8,
    pub text: String,
    #[serde(default)]
    pub helpful_count: u32,
}

/// Structured safety summary produced by the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSummary {
    pub overall_safety_consensus: String,
    pub key_warnings: Vec<String>,
    pub best_times_to_visit: Vec<String>,
}

/// One logical request cycle. Results carrying an older `session_id` are
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSession {
    pub session_id: Uuid,
    pub query: String,
    pub created_at: DateTime<Utc>,
}

impl SearchSession {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            query: query.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPhase {
    #[default]
    Idle,
    Debouncing,
    Fetching,
    Ready,
    Failed,
}

/// Observable state of the summary panel.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SummaryState {
    pub phase: SummaryPhase,
    #[serde(default)]
    pub summary: Option<AiSummary>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub is_expanded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined,
    Denied,
    Restricted,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        matches!(
            self,
            AuthorizationStatus::AuthorizedWhenInUse | AuthorizationStatus::AuthorizedAlways
        )
    }
}

/// Change notifications published by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    SuggestionsUpdated {
        session_id: Option<Uuid>,
        suggestions: Vec<SearchSuggestion>,
    },
    PopularPlacesUpdated {
        session_id: Option<Uuid>,
        places: Vec<SearchSuggestion>,
    },
    SummaryStateChanged {
        state: SummaryState,
    },
    LocationAuthorizationChanged {
        status: AuthorizationStatus,
    },
}
