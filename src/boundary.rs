// State boundaries: loading, enrichment with state totals, simplification.
use crate::error::{Result, SisserError};
use crate::types::StateAggregate;
use geo::{Contains, Geometry, LineString, MultiPolygon, Polygon, SimplifyVwPreserve};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Property holding the two-letter state code on each boundary feature.
pub const STATE_CODE_PROPERTY: &str = "SIGLA_UF";
pub const DEFAULT_TOLERANCE: f64 = 0.01;

pub fn load_boundary(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path).map_err(|source| SisserError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => {
            debug!(path = %path.display(), features = fc.features.len(), "boundary read");
            Ok(fc)
        }
        _ => Err(SisserError::GeoJson(format!(
            "{} is not a FeatureCollection",
            path.display()
        ))),
    }
}

pub fn write_boundary(fc: &FeatureCollection, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string(fc)?)?;
    info!(path = %path.display(), features = fc.features.len(), "boundary written");
    Ok(())
}

pub fn state_code(feature: &Feature) -> Option<&str> {
    feature.property(STATE_CODE_PROPERTY).and_then(JsonValue::as_str)
}

/// Left join of the boundary features onto the state totals.
///
/// Every feature is kept exactly once. Features whose state has no totals
/// get `null` metrics, never zero.
pub fn merge_geo(boundary: &FeatureCollection, states: &[StateAggregate]) -> FeatureCollection {
    let by_code: HashMap<&str, &StateAggregate> =
        states.iter().map(|s| (s.state.as_str(), s)).collect();
    let mut unmatched = 0usize;
    let features = boundary
        .features
        .iter()
        .map(|feature| {
            let mut feature = feature.clone();
            let agg = state_code(&feature).and_then(|code| by_code.get(code).copied());
            match agg {
                Some(s) => {
                    feature.set_property("SG_UF_PROPRIEDADE", s.state.clone());
                    feature.set_property("area_total", s.area_total);
                    feature.set_property("valor_total", s.valor_total);
                    feature.set_property("numero_seguros", s.numero_seguros);
                }
                None => {
                    unmatched += 1;
                    for key in ["SG_UF_PROPRIEDADE", "area_total", "valor_total", "numero_seguros"] {
                        feature.set_property(key, JsonValue::Null);
                    }
                }
            }
            feature
        })
        .collect();
    if unmatched > 0 {
        debug!(unmatched, "boundary features without state totals");
    }
    FeatureCollection {
        bbox: boundary.bbox.clone(),
        features,
        foreign_members: boundary.foreign_members.clone(),
    }
}

fn ring_collapsed(ring: &LineString<f64>) -> bool {
    ring.0.len() < 4
}

fn holes_inside_shell(polygon: &Polygon<f64>) -> bool {
    let shell = Polygon::new(polygon.exterior().clone(), vec![]);
    polygon
        .interiors()
        .iter()
        .all(|ring| ring.0.iter().all(|c| shell.contains(c)))
}

fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    let simplified = polygon.simplify_vw_preserve(&(tolerance * tolerance));
    // Rings need four coordinates and holes must stay inside the shell;
    // otherwise the original polygon is kept.
    if ring_collapsed(simplified.exterior())
        || simplified.interiors().iter().any(ring_collapsed)
        || !holes_inside_shell(&simplified)
    {
        polygon.clone()
    } else {
        simplified
    }
}

/// Topology-preserving Visvalingam-Whyatt simplification of every polygon.
/// `tolerance` is a distance in source coordinate units; vertices whose
/// triangle is smaller than `tolerance²` go, unless removing them would make
/// a ring cross itself or another ring of the same polygon. A polygon whose
/// holes would end up outside its shell is left as it was. Non-polygon
/// geometries pass through unchanged.
pub fn simplify_boundary(boundary: &FeatureCollection, tolerance: f64) -> FeatureCollection {
    let mut out = boundary.clone();
    for feature in &mut out.features {
        let code = state_code(feature).map(str::to_string);
        let Some(geometry) = feature.geometry.as_mut() else {
            continue;
        };
        let shape = match Geometry::<f64>::try_from(geometry.value.clone()) {
            Ok(shape) => shape,
            Err(e) => {
                warn!(state = ?code, error = %e, "geometry left unsimplified");
                continue;
            }
        };
        let simplified = match shape {
            Geometry::Polygon(p) => Geometry::Polygon(simplify_polygon(&p, tolerance)),
            Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(MultiPolygon::new(
                mp.0.iter().map(|p| simplify_polygon(p, tolerance)).collect(),
            )),
            _ => continue,
        };
        geometry.value = geojson::Value::from(&simplified);
    }
    out
}
