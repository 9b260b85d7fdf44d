// crates/tvws-core/src/runtime/polygon_index.rs
// ============================================================================
// Module: TVWS Region Polygon Index
// Description: Per-region boundary polygons and point-in-region lookups.
// Purpose: Resolve which regulatory region a location belongs to.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Each region's polygons are ordered by descending bounding-box area so the
//! common case (a point inside a large contiguous area) exits after the first
//! test. The sort is stable, so equal-area polygons keep store order and
//! lookups stay deterministic. The cache publishes a whole
//! [`RegionPolygonSet`] at a time; readers never observe a partially rebuilt
//! region.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::GeoPoint;
use crate::core::RegionCode;
use crate::core::RegionPolygonRecord;
use crate::interfaces::IncumbentStore;
use crate::interfaces::StoreEntity;
use crate::interfaces::StoreError;
use crate::interfaces::decode_row;

// ============================================================================
// SECTION: Region Polygons
// ============================================================================

/// Boundary polygons of one region, largest bounding box first.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPolygons {
    /// Region code.
    region: RegionCode,
    /// Polygons in containment-test order.
    polygons: Vec<RegionPolygonRecord>,
}

impl RegionPolygons {
    /// Orders polygons by descending bounding-box area.
    #[must_use]
    pub fn new(region: RegionCode, mut polygons: Vec<RegionPolygonRecord>) -> Self {
        polygons.sort_by(|a, b| {
            b.polygon.bounds().area().total_cmp(&a.polygon.bounds().area())
        });
        Self { region, polygons }
    }

    /// Fetches a region's polygons from the store. Rows that fail to decode
    /// or belong to another region are dropped and counted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the partition cannot be read.
    pub fn load(
        store: &dyn IncumbentStore,
        region: &RegionCode,
    ) -> Result<(Self, usize), StoreError> {
        let rows = store.fetch_partition(RegionPolygonRecord::TABLE, region.as_str())?;
        let mut dropped = 0;
        let mut polygons = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row::<RegionPolygonRecord>(row) {
                Ok(record) if &record.region == region => polygons.push(record),
                _ => dropped += 1,
            }
        }
        Ok((Self::new(region.clone(), polygons), dropped))
    }

    /// Region code.
    #[must_use]
    pub const fn region(&self) -> &RegionCode {
        &self.region
    }

    /// Polygons in test order.
    #[must_use]
    pub fn polygons(&self) -> &[RegionPolygonRecord] {
        &self.polygons
    }

    /// Returns true when any polygon contains `point`, testing largest first.
    #[must_use]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.polygons.iter().any(|record| record.polygon.contains(point))
    }
}

// ============================================================================
// SECTION: Region Polygon Set
// ============================================================================

/// Immutable polygons for every configured region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionPolygonSet {
    /// Regions in code order.
    regions: BTreeMap<RegionCode, RegionPolygons>,
}

impl RegionPolygonSet {
    /// Builds a set from per-region polygons.
    #[must_use]
    pub fn new(regions: impl IntoIterator<Item = RegionPolygons>) -> Self {
        Self {
            regions: regions.into_iter().map(|polygons| (polygons.region.clone(), polygons)).collect(),
        }
    }

    /// Loads every listed region from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any partition cannot be read.
    pub fn load<'a>(
        store: &dyn IncumbentStore,
        regions: impl IntoIterator<Item = &'a RegionCode>,
    ) -> Result<(Self, usize), StoreError> {
        let mut dropped = 0;
        let mut loaded = Vec::new();
        for region in regions {
            let (polygons, region_dropped) = RegionPolygons::load(store, region)?;
            dropped += region_dropped;
            loaded.push(polygons);
        }
        Ok((Self::new(loaded), dropped))
    }

    /// Polygons for a region.
    #[must_use]
    pub fn get(&self, region: &RegionCode) -> Option<&RegionPolygons> {
        self.regions.get(region)
    }

    /// Total polygon count.
    #[must_use]
    pub fn polygon_count(&self) -> usize {
        self.regions.values().map(|region| region.polygons.len()).sum()
    }

    /// Returns true when `region` is known and contains `point`.
    #[must_use]
    pub fn contains(&self, region: &RegionCode, point: &GeoPoint) -> bool {
        self.regions.get(region).is_some_and(|polygons| polygons.contains(point))
    }

    /// First region, in code order, whose polygons contain `point`.
    #[must_use]
    pub fn find_region_for(&self, point: &GeoPoint) -> Option<RegionCode> {
        self.regions
            .values()
            .find(|polygons| polygons.contains(point))
            .map(|polygons| polygons.region.clone())
    }
}
