use super::db::{Database, DatabaseError};
use super::models::{MarkerRecord, ShapeRecord};
use super::tables::*;

impl Database {
    // ========================================================================
    // Shapes and markers
    // ========================================================================

    pub fn insert_shape(&self, shape: &ShapeRecord) -> Result<(), DatabaseError> {
        let data = rmp_serde::to_vec_named(shape)?;
        self.insert_owned(SHAPES, OWNER_SHAPES, &shape.id, &shape.owner_id, &data)
    }

    /// Shapes owned by a user, oldest first
    pub fn list_shapes(&self, owner_id: &str) -> Result<Vec<ShapeRecord>, DatabaseError> {
        let mut shapes: Vec<ShapeRecord> = self.list_owned(SHAPES, OWNER_SHAPES, owner_id)?;
        shapes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(shapes)
    }

    pub fn insert_marker(&self, marker: &MarkerRecord) -> Result<(), DatabaseError> {
        let data = rmp_serde::to_vec_named(marker)?;
        self.insert_owned(MARKERS, OWNER_MARKERS, &marker.id, &marker.owner_id, &data)
    }

    /// Markers owned by a user, oldest first
    pub fn list_markers(&self, owner_id: &str) -> Result<Vec<MarkerRecord>, DatabaseError> {
        let mut markers: Vec<MarkerRecord> = self.list_owned(MARKERS, OWNER_MARKERS, owner_id)?;
        markers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(markers)
    }
}
