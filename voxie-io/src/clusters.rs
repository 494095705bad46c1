//! Cluster list persistence.
//!
//! A cluster list is a one-dimensional dataset of the compound
//! `{timestamp: i64, x: f32, y: f32, energy: f32}`. The XRF settings used to
//! produce it are kept as attributes on the same dataset.

use crate::container::{Dataset, Group, Location};
use crate::Result;
use voxie_algorithms::{Cluster, XrfCorrectionSettings};

crate::impl_storable_compound!(Cluster {
    timestamp: i64,
    x: f32,
    y: f32,
    energy: f32,
});

const ATTR_ENABLED: &str = "xrf_enabled";
const ATTR_MIN_ENERGY: &str = "xrf_min_energy";
const ATTR_MAX_ENERGY: &str = "xrf_max_energy";
const ATTR_DISTANCE_LIMIT: &str = "xrf_distance_limit";
const ATTR_TEMPORAL_MARGIN: &str = "xrf_temporal_margin";

/// Stores `clusters` as a new dataset `name` under `group`.
///
/// # Errors
/// Returns [`Error::AlreadyExists`](crate::Error::AlreadyExists) if `name`
/// is taken.
pub fn write_clusters(group: &Group, name: &str, clusters: &[Cluster]) -> Result<Dataset> {
    let dataset = group.new_dataset::<Cluster>(name, &[clusters.len()])?;
    dataset.write(clusters)?;
    log::debug!("stored {} clusters in {name}", clusters.len());
    Ok(dataset)
}

/// Loads the cluster dataset `name` under `group`.
///
/// # Errors
/// Returns [`Error::NotFound`](crate::Error::NotFound) if it is missing and
/// [`Error::TypeMismatch`](crate::Error::TypeMismatch) if it is not a
/// cluster list.
pub fn read_clusters(group: &Group, name: &str) -> Result<Vec<Cluster>> {
    group.dataset(name)?.read()
}

/// Records XRF correction settings as attributes.
///
/// # Errors
/// Returns [`Error::ReadOnly`](crate::Error::ReadOnly) on read-only files.
pub fn write_xrf_settings(location: &Location, settings: &XrfCorrectionSettings) -> Result<()> {
    location.set_attr(ATTR_ENABLED, &settings.enabled)?;
    location.set_attr(ATTR_MIN_ENERGY, &settings.min_energy)?;
    location.set_attr(ATTR_MAX_ENERGY, &settings.max_energy)?;
    location.set_attr(ATTR_DISTANCE_LIMIT, &settings.distance_limit)?;
    location.set_attr(ATTR_TEMPORAL_MARGIN, &settings.temporal_margin)
}

/// Reads XRF correction settings stored by [`write_xrf_settings`].
///
/// Returns `None` if the location carries no settings.
///
/// # Errors
/// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) if an
/// attribute has an unexpected type.
pub fn read_xrf_settings(location: &Location) -> Result<Option<XrfCorrectionSettings>> {
    if !location.has_attr(ATTR_ENABLED)? {
        return Ok(None);
    }
    Ok(Some(XrfCorrectionSettings {
        enabled: location.attr(ATTR_ENABLED)?,
        min_energy: location.attr(ATTR_MIN_ENERGY)?,
        max_energy: location.attr(ATTR_MAX_ENERGY)?,
        distance_limit: location.attr(ATTR_DISTANCE_LIMIT)?,
        temporal_margin: location.attr(ATTR_TEMPORAL_MARGIN)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{File, Storable, TypeDescriptor};
    use tempfile::tempdir;

    #[test]
    fn test_cluster_layout() {
        let TypeDescriptor::Compound(compound) = Cluster::type_descriptor() else {
            panic!("cluster should be a compound");
        };
        let layout: Vec<(&str, usize)> = compound
            .fields()
            .iter()
            .map(|f| (f.name.as_str(), f.offset))
            .collect();
        assert_eq!(
            layout,
            vec![("timestamp", 0), ("x", 8), ("y", 12), ("energy", 16)]
        );
        assert_eq!(compound.size(), 20);
    }

    #[test]
    fn test_settings_attributes() {
        let dir = tempdir().unwrap();
        let file = File::create(dir.path().join("settings.vxc")).unwrap();
        let dataset = write_clusters(&file, "clusters", &[]).unwrap();
        assert!(read_xrf_settings(&dataset).unwrap().is_none());

        let settings = XrfCorrectionSettings::new()
            .with_enabled(true)
            .with_energy_band(2.0, 18.5)
            .with_temporal_margin(250);
        write_xrf_settings(&dataset, &settings).unwrap();
        assert_eq!(read_xrf_settings(&dataset).unwrap(), Some(settings));
    }
}
