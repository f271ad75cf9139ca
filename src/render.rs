use crate::config::MapConfig;
use crate::processing::{Breakpoints, ColorTier};
use crate::types::StyledSchool;
use anyhow::{Context, Result};
use askama::Template;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// What the page script needs per marker.
#[derive(Serialize)]
struct MarkerSpec<'a> {
    lat: f64,
    lon: f64,
    radius: f64,
    fill: &'a str,
    popup: String,
}

#[derive(Template)]
#[template(
    source = "<b>{{ name }}</b><br>School ID: {{ school_id }}<br>Teachers: {{ teacher_count }}<br>",
    ext = "html"
)]
struct PopupTemplate<'a> {
    name: &'a str,
    school_id: &'a str,
    teacher_count: u32,
}

struct LegendRow {
    color: &'static str,
    text: String,
}

#[derive(Template)]
#[template(path = "map.html")]
struct MapTemplate<'a> {
    title: &'a str,
    subtitle: &'a str,
    legend_title: &'a str,
    legend: Vec<LegendRow>,
    zoom: u8,
    center_json: String,
    tile_url_json: String,
    attribution_json: String,
    markers_json: String,
}

fn popup_html(school: &StyledSchool) -> Result<String> {
    let popup = PopupTemplate {
        name: &school.name,
        school_id: &school.school_id,
        teacher_count: school.teacher_count,
    };
    Ok(popup.render()?)
}

/// JSON is embedded in a `<script>` block, so `</` must not survive.
fn script_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn legend_rows(breakpoints: &Breakpoints, max_count: u32) -> Vec<LegendRow> {
    let mut rows = vec![LegendRow {
        color: ColorTier::NoData.color(),
        text: "No teachers".to_string(),
    }];
    rows.extend(
        breakpoints
            .legend_ranges(max_count)
            .into_iter()
            .map(|(tier, low, high)| LegendRow {
                color: tier.color(),
                text: format!("{} - {} teachers", low, high),
            }),
    );
    rows
}

/// Standalone Leaflet page: basemap, one circle marker per school, legend
/// and title overlays.
pub fn render_map_html(config: &MapConfig, schools: &[StyledSchool], breakpoints: &Breakpoints) -> Result<String> {
    let max_count = schools.iter().map(|s| s.teacher_count).max().unwrap_or(0);
    let markers = schools
        .iter()
        .map(|s| {
            Ok(MarkerSpec {
                lat: s.lat,
                lon: s.lon,
                radius: s.radius,
                fill: s.color,
                popup: popup_html(s)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let page = MapTemplate {
        title: &config.title,
        subtitle: &config.subtitle,
        legend_title: &config.legend_title,
        legend: legend_rows(breakpoints, max_count),
        zoom: config.zoom,
        center_json: script_json(&config.center)?,
        tile_url_json: script_json(&config.tile_url)?,
        attribution_json: script_json(&config.attribution)?,
        markers_json: script_json(&markers)?,
    };
    page.render().context("Failed to render the map page")
}

pub fn schools_geojson(schools: &[StyledSchool]) -> GeoJson {
    let features = schools
        .iter()
        .map(|s| {
            let mut properties = JsonObject::new();
            properties.insert("school_id".to_string(), s.school_id.clone().into());
            properties.insert("name".to_string(), s.name.clone().into());
            properties.insert("teacher_count".to_string(), s.teacher_count.into());
            properties.insert("tier".to_string(), s.tier.into());
            properties.insert("color".to_string(), s.color.into());
            properties.insert("radius".to_string(), s.radius.into());

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![s.lon, s.lat]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styled(id: &str, name: &str, count: u32, color: &'static str) -> StyledSchool {
        StyledSchool {
            school_id: id.to_string(),
            name: name.to_string(),
            lat: 40.75,
            lon: -73.98,
            teacher_count: count,
            tier: "x",
            color,
            radius: 3.0,
        }
    }

    #[test]
    fn popup_escapes_markup() {
        let popup = popup_html(&styled("P.S. 6", "P.S. <6> & Co", 4, "#FED976")).unwrap();
        assert!(popup.starts_with("<b>P.S. &lt;6&gt; &amp; Co</b><br>"));
        assert!(popup.contains("School ID: P.S. 6<br>"));
        assert!(popup.ends_with("Teachers: 4<br>"));
    }

    #[test]
    fn legend_shows_live_ranges() {
        let schools = [styled("A", "Alpha", 12, "#BD0026"), styled("B", "Beta", 0, "#CCCCCC")];
        let html = render_map_html(&MapConfig::default(), &schools, &Breakpoints([2, 4, 6, 8])).unwrap();

        assert!(html.contains("UFT Member Count"));
        assert!(html.contains("No teachers"));
        assert!(html.contains("1 - 2 teachers"));
        assert!(html.contains("7 - 8 teachers"));
        assert!(html.contains("9 - 12 teachers"));
        assert!(html.contains("Manhattan Schools - Teacher Density Map"));
        assert!(html.contains("setView([40.7831,-73.9712], 12)"));
    }

    #[test]
    fn one_marker_per_school_with_safe_popup() {
        let schools = [
            styled("A", "Alpha</script>", 3, "#FFEDA0"),
            styled("B", "Beta", 0, "#CCCCCC"),
        ];
        let html = render_map_html(&MapConfig::default(), &schools, &Breakpoints([1, 2, 3, 4])).unwrap();

        assert_eq!(html.matches("\"fill\":").count(), 2);
        assert!(html.contains("Alpha&lt;"));
        assert!(!html.contains("Alpha</script>"));
        assert_eq!(html.matches("</script>").count(), 2);
        assert!(html.contains("Teachers: 3"));
    }

    #[test]
    fn geojson_points_are_lon_lat() {
        let geojson = schools_geojson(&[styled("A", "Alpha", 5, "#FED976")]);
        let GeoJson::FeatureCollection(fc) = geojson else {
            panic!("expected a feature collection");
        };
        assert_eq!(fc.features.len(), 1);

        let feature = &fc.features[0];
        let geometry = feature.geometry.as_ref().unwrap();
        assert_eq!(geometry.value, Value::Point(vec![-73.98, 40.75]));
        let props = feature.properties.as_ref().unwrap();
        assert_eq!(props["teacher_count"], serde_json::json!(5));
        assert_eq!(props["color"], serde_json::json!("#FED976"));
    }
}
