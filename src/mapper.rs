use crate::config::AppConfig;
use crate::data::{self, SchoolTable};
use crate::processing::{self, Breakpoints, RadiusScale};
use crate::render;
use crate::report::Summary;
use crate::types::{MergedSchool, StyledSchool};
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

const REPORT_HEADING: &str = "Manhattan Schools Teacher Density Analysis";

/// The joined and styled data set, before anything is written.
#[derive(Debug, Clone)]
pub struct DensityData {
    pub merged: Vec<MergedSchool>,
    pub styled: Vec<StyledSchool>,
    pub breakpoints: Breakpoints,
}

#[derive(Debug, Clone)]
pub struct MapOutputs {
    pub map_html: PathBuf,
    pub summary: PathBuf,
    pub geojson: PathBuf,
    pub summary_stats: Summary,
}

/// Checks inputs, loads both tables, joins them and styles every located school.
pub fn prepare(config: &AppConfig) -> Result<DensityData> {
    data::check_required_files(&[
        ("schools", config.input.schools.as_path()),
        ("teachers", config.input.roster.as_path()),
    ])?;

    let schools = SchoolTable::load(&config.input.schools, &config.columns)?.schools()?;
    let roster = data::load_roster(&config.input.roster, &config.columns)?;

    let counts = processing::count_teachers(&roster);
    info!("Unique member groups: {:?}", processing::member_groups(&roster));
    info!("Number of schools with teachers: {}", counts.len());

    let outcome = processing::merge(&schools, &counts);
    let breakpoints = Breakpoints::from_counts(outcome.merged.iter().map(|m| m.teacher_count));
    let radius = RadiusScale {
        base: config.map.radius_base,
        scale: config.map.radius_scale,
    };
    let styled = processing::style_schools(&outcome.merged, &breakpoints, &radius);

    Ok(DensityData {
        merged: outcome.merged,
        styled,
        breakpoints,
    })
}

/// Full mapper run: HTML map, GeoJSON and the text summary.
pub fn run(config: &AppConfig) -> Result<MapOutputs> {
    let density = prepare(config)?;
    let summary = Summary::from_merged(&density.merged, density.breakpoints);

    info!(
        "Teacher counts: min {:?}, max {:?}, mean {:.1}, {} schools without teachers",
        summary.min,
        summary.max,
        summary.mean.unwrap_or(0.0),
        summary.without_teachers
    );
    for (tier, low, high) in density.breakpoints.legend_ranges(summary.max.unwrap_or(0)) {
        info!("{}: {}-{} teachers", tier.label(), low, high);
    }

    let outputs = MapOutputs {
        map_html: config.output.map_html_path(),
        summary: config.output.summary_path(),
        geojson: config.output.geojson_path(),
        summary_stats: summary,
    };

    let html = render::render_map_html(&config.map, &density.styled, &density.breakpoints)?;
    render::write_output(&outputs.map_html, &html)?;

    let geojson = render::schools_geojson(&density.styled);
    render::write_output(&outputs.geojson, &geojson.to_string())?;

    render::write_output(&outputs.summary, &outputs.summary_stats.render_text(REPORT_HEADING))?;

    Ok(outputs)
}
