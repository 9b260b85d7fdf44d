// crates/tvws-core/src/core/mod.rs
// ============================================================================
// Module: TVWS Core Types
// Description: Canonical incumbent, geometry, device, and spectrum structures.
// Purpose: Provide stable, serializable types shared by every API surface.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Core types describe protected incumbents, region boundaries, device
//! descriptors, and the spectrum payloads returned to devices. They are
//! immutable values: the cache publishes them, the engine reads them, and the
//! protocol layer serializes them.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod device;
pub mod events;
pub mod geo;
pub mod identifiers;
pub mod incumbent;
pub mod region;
pub mod spectrum;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use device::AntennaCharacteristics;
pub use device::DeviceDescriptor;
pub use device::DeviceOwner;
pub use device::DeviceRegistration;
pub use device::DeviceType;
pub use device::Ellipse;
pub use device::HeightType;
pub use device::Location;
pub use events::CacheEvent;
pub use events::CacheEventKind;
pub use geo::BoundingBox;
pub use geo::GeoError;
pub use geo::GeoPoint;
pub use geo::Polygon;
pub use identifiers::Authority;
pub use identifiers::RegionCode;
pub use identifiers::RulesetId;
pub use incumbent::CacheKey;
pub use incumbent::DatasetKind;
pub use incumbent::IncumbentKind;
pub use incumbent::IncumbentRecord;
pub use incumbent::RegionPolygonRecord;
pub use incumbent::SyncStatus;
pub use region::DeviceClassLimits;
pub use region::DeviceClassRules;
pub use region::KindDistances;
pub use region::RegionCatalog;
pub use region::RegionRules;
pub use region::RegionRulesError;
pub use spectrum::ChannelInfo;
pub use spectrum::EventTime;
pub use spectrum::Exclusion;
pub use spectrum::OperatingMode;
pub use spectrum::RulesetInfo;
pub use spectrum::SpectrumSchedule;
pub use spectrum::SpectrumSpec;
pub use spectrum::WhitespaceSummary;
pub use spectrum::whitespace_summary;
pub use time::TimeError;
pub use time::Timestamp;
pub use time::ValidityWindow;
