use uuid::Uuid;
use veou_schema::{Coordinate, PlaceAnnotation};

/// Active pins on the map. Repeated searches construct fresh annotations
/// for the same spot, so insertion dedups by coordinate while identity stays
/// with the annotation id.
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    annotations: Vec<PlaceAnnotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Uuid),
    /// An annotation at the same coordinate already exists.
    Existing(Uuid),
}

impl InsertOutcome {
    pub fn id(self) -> Uuid {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Existing(id) => id,
        }
    }
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, annotation: PlaceAnnotation) -> InsertOutcome {
        if let Some(existing) = self.find_at(&annotation.coordinate) {
            return InsertOutcome::Existing(existing.id);
        }
        let id = annotation.id;
        self.annotations.push(annotation);
        InsertOutcome::Inserted(id)
    }

    pub fn find_at(&self, coordinate: &Coordinate) -> Option<&PlaceAnnotation> {
        self.annotations.iter().find(|a| a.coordinate == *coordinate)
    }

    pub fn get(&self, id: Uuid) -> Option<&PlaceAnnotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<PlaceAnnotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaceAnnotation> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}
