use crate::types::{MergedSchool, RosterEntry, School, StyledSchool};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Join key of a school id: the text before the first comma, trimmed.
/// `"M015, P.S. 015 Roberto Clemente"` → `"M015"`.
pub fn extract_school_key(id: &str) -> &str {
    id.split(',').next().unwrap_or("").trim()
}

pub fn count_teachers(roster: &[RosterEntry]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for entry in roster {
        *counts.entry(entry.school_id.clone()).or_insert(0) += 1;
    }
    counts
}

pub fn member_groups(roster: &[RosterEntry]) -> BTreeSet<&str> {
    roster.iter().map(|e| e.member_group.as_str()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub merged: Vec<MergedSchool>,
    pub dropped_without_location: usize,
    /// Roster ids that matched no school; they do not contribute anywhere.
    pub unmatched_roster_ids: Vec<String>,
}

/// Left join of schools onto teacher counts. Unmatched schools get 0 and
/// schools without coordinates are dropped.
pub fn merge(schools: &[School], counts: &BTreeMap<String, u32>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut matched: BTreeSet<&str> = BTreeSet::new();

    for school in schools {
        let key = extract_school_key(&school.id);
        let teacher_count = match counts.get_key_value(key) {
            Some((k, &count)) => {
                matched.insert(k.as_str());
                count
            }
            None => 0,
        };

        let Some(location) = school.location else {
            outcome.dropped_without_location += 1;
            continue;
        };

        outcome.merged.push(MergedSchool {
            key: key.to_string(),
            name: school.name.clone().unwrap_or_else(|| "Unknown School".to_string()),
            location,
            teacher_count,
        });
    }

    outcome.unmatched_roster_ids = counts
        .keys()
        .filter(|k| !matched.contains(k.as_str()))
        .cloned()
        .collect();

    info!(
        "Merged {} schools ({} dropped without coordinates, {} roster ids unmatched)",
        outcome.merged.len(),
        outcome.dropped_without_location,
        outcome.unmatched_roster_ids.len()
    );
    outcome
}

/// Quantile of ascending `sorted` data with linear interpolation between
/// the two closest ranks.
pub fn quantile(sorted: &[u32], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b) = (sorted[lo] as f64, sorted[hi] as f64);
    Some(a + (b - a) * (pos - lo as f64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTier {
    NoData,
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    Tier5,
}

impl ColorTier {
    pub fn color(self) -> &'static str {
        match self {
            ColorTier::NoData => "#CCCCCC",
            ColorTier::Tier1 => "#FFEDA0",
            ColorTier::Tier2 => "#FED976",
            ColorTier::Tier3 => "#FEB24C",
            ColorTier::Tier4 => "#FD8D3C",
            ColorTier::Tier5 => "#BD0026",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ColorTier::NoData => "No data",
            ColorTier::Tier1 => "Light yellow",
            ColorTier::Tier2 => "Yellow",
            ColorTier::Tier3 => "Orange",
            ColorTier::Tier4 => "Dark orange",
            ColorTier::Tier5 => "Dark red",
        }
    }
}

/// Quintile cut points over the schools with at least one teacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Breakpoints(pub [u32; 4]);

impl Breakpoints {
    pub fn from_counts<I: IntoIterator<Item = u32>>(counts: I) -> Self {
        let mut positive: Vec<u32> = counts.into_iter().filter(|&c| c > 0).collect();
        positive.sort_unstable();

        let mut points = [0u32; 4];
        for (slot, q) in points.iter_mut().zip([0.2, 0.4, 0.6, 0.8]) {
            *slot = quantile(&positive, q).map_or(0, |v| v.floor() as u32);
        }
        Breakpoints(points)
    }

    pub fn tier_for(&self, count: u32) -> ColorTier {
        let [b1, b2, b3, b4] = self.0;
        if count == 0 {
            ColorTier::NoData
        } else if count <= b1 {
            ColorTier::Tier1
        } else if count <= b2 {
            ColorTier::Tier2
        } else if count <= b3 {
            ColorTier::Tier3
        } else if count <= b4 {
            ColorTier::Tier4
        } else {
            ColorTier::Tier5
        }
    }

    /// Inclusive `(low, high)` counts shown in the legend for each ranked tier.
    pub fn legend_ranges(&self, max_count: u32) -> [(ColorTier, u32, u32); 5] {
        let [b1, b2, b3, b4] = self.0;
        [
            (ColorTier::Tier1, 1, b1),
            (ColorTier::Tier2, b1 + 1, b2),
            (ColorTier::Tier3, b2 + 1, b3),
            (ColorTier::Tier4, b3 + 1, b4),
            (ColorTier::Tier5, b4 + 1, max_count),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusScale {
    pub base: f64,
    pub scale: f64,
}

impl RadiusScale {
    pub fn radius_for(&self, count: u32) -> f64 {
        if count == 0 {
            return self.base;
        }
        self.base + (count as f64).sqrt() * self.scale
    }
}

pub fn style_schools(merged: &[MergedSchool], breakpoints: &Breakpoints, radius: &RadiusScale) -> Vec<StyledSchool> {
    merged
        .iter()
        .map(|school| {
            let tier = breakpoints.tier_for(school.teacher_count);
            StyledSchool {
                school_id: school.key.clone(),
                name: school.name.clone(),
                lat: school.lat(),
                lon: school.lon(),
                teacher_count: school.teacher_count,
                tier: tier.label(),
                color: tier.color(),
                radius: radius.radius_for(school.teacher_count),
            }
        })
        .collect()
}
