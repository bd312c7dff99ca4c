//! Collaborator seams: where places come from and where the user is.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use veou_bus::BusPublisher;
use veou_schema::{AuthorizationStatus, BusMessage, Coordinate, Region};

/// A resolved point of interest returned by a place search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub address_line: String,
    /// Number of named areas of interest the place belongs to; used as a
    /// popularity signal.
    #[serde(default)]
    pub area_of_interest_count: usize,
}

/// An autocomplete entry; no coordinate until resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
}

#[async_trait]
pub trait PlaceSearchProvider: Send + Sync {
    /// Free-text search. `None` region means unbounded.
    async fn search(&self, query: &str, region: Option<Region>) -> Result<Vec<PlaceResult>>;

    async fn autocomplete(&self, fragment: &str, region: Option<Region>)
        -> Result<Vec<Completion>>;
}

pub trait LocationProvider: Send + Sync {
    fn current_coordinate(&self) -> Option<Coordinate>;

    fn authorization_status(&self) -> AuthorizationStatus;
}

/// Location fed from outside (a device bridge, the CLI flags, tests).
#[derive(Debug, Default)]
pub struct ManualLocation {
    state: RwLock<(Option<Coordinate>, AuthorizationStatus)>,
}

impl ManualLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorized and positioned at `coordinate`.
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            state: RwLock::new((
                Some(coordinate),
                AuthorizationStatus::AuthorizedWhenInUse,
            )),
        }
    }

    pub fn update(&self, coordinate: Option<Coordinate>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.0 = coordinate;
    }

    /// Records the new status and notifies subscribers when it changed.
    pub async fn set_authorization(
        &self,
        status: AuthorizationStatus,
        bus: &BusPublisher,
    ) -> Result<()> {
        let changed = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let changed = state.1 != status;
            state.1 = status;
            changed
        };
        if changed {
            tracing::info!(?status, "location authorization changed");
            bus.publish(BusMessage::LocationAuthorizationChanged { status })
                .await?;
        }
        Ok(())
    }
}

impl LocationProvider for ManualLocation {
    fn current_coordinate(&self) -> Option<Coordinate> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.1.is_authorized() {
            state.0
        } else {
            None
        }
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state.read().unwrap_or_else(|e| e.into_inner()).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veou_bus::{EventBus, Topic};

    #[test]
    fn coordinate_hidden_until_authorized() {
        let location = ManualLocation::new();
        location.update(Some(Coordinate::new(1.0, 2.0)));
        assert_eq!(location.current_coordinate(), None);
        assert_eq!(
            location.authorization_status(),
            AuthorizationStatus::NotDetermined
        );

        let location = ManualLocation::at(Coordinate::new(1.0, 2.0));
        assert_eq!(location.current_coordinate(), Some(Coordinate::new(1.0, 2.0)));
    }

    #[tokio::test]
    async fn authorization_change_is_published_once() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe(Topic::LocationAuthorizationChanged).await;
        let location = ManualLocation::new();
        let publisher = bus.publisher();

        location
            .set_authorization(AuthorizationStatus::AuthorizedAlways, &publisher)
            .await
            .unwrap();
        location
            .set_authorization(AuthorizationStatus::AuthorizedAlways, &publisher)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            BusMessage::LocationAuthorizationChanged {
                status: AuthorizationStatus::AuthorizedAlways
            }
        ));
        assert!(rx.try_recv().is_err());
    }
}
