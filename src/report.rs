use crate::processing::{quantile, Breakpoints};
use crate::types::MergedSchool;

const TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TopSchool {
    pub school_id: String,
    pub name: String,
    pub teacher_count: u32,
}

/// Statistics over the merged, located schools. Zero-count schools are
/// included in mean, median and min.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_schools: usize,
    pub with_teachers: usize,
    pub without_teachers: usize,
    pub total_teachers: u64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub breakpoints: Breakpoints,
    pub top: Vec<TopSchool>,
}

impl Summary {
    pub fn from_merged(merged: &[MergedSchool], breakpoints: Breakpoints) -> Self {
        let mut counts: Vec<u32> = merged.iter().map(|m| m.teacher_count).collect();
        counts.sort_unstable();

        let total_teachers: u64 = counts.iter().map(|&c| c as u64).sum();
        let with_teachers = counts.iter().filter(|&&c| c > 0).count();
        let mean = (!counts.is_empty()).then(|| total_teachers as f64 / counts.len() as f64);

        let mut ranked: Vec<&MergedSchool> = merged.iter().filter(|m| m.teacher_count > 0).collect();
        // Stable, so equal counts keep table order.
        ranked.sort_by(|a, b| b.teacher_count.cmp(&a.teacher_count));
        let top = ranked
            .into_iter()
            .take(TOP_N)
            .map(|m| TopSchool {
                school_id: m.key.clone(),
                name: m.name.clone(),
                teacher_count: m.teacher_count,
            })
            .collect();

        Summary {
            total_schools: counts.len(),
            with_teachers,
            without_teachers: counts.len() - with_teachers,
            total_teachers,
            mean,
            median: quantile(&counts, 0.5),
            min: counts.first().copied(),
            max: counts.last().copied(),
            breakpoints,
            top,
        }
    }

    pub fn render_text(&self, heading: &str) -> String {
        let one_decimal = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}", v));
        let int = |v: Option<u32>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());

        let mut out = String::with_capacity(1024);
        out.push_str(&format!("{}\n", heading));
        out.push_str(&format!("{}\n\n", "=".repeat(heading.chars().count())));
        out.push_str(&format!("Total schools in dataset: {}\n", self.total_schools));
        out.push_str(&format!("Schools with teacher data: {}\n", self.with_teachers));
        out.push_str(&format!("Schools without teacher data: {}\n\n", self.without_teachers));
        out.push_str("Teacher Statistics:\n");
        out.push_str(&format!("- Total teachers: {}\n", self.total_teachers));
        out.push_str(&format!("- Average teachers per school: {}\n", one_decimal(self.mean)));
        out.push_str(&format!("- Median teachers per school: {}\n", one_decimal(self.median)));
        out.push_str(&format!("- Max teachers at a school: {}\n", int(self.max)));
        out.push_str(&format!("- Min teachers at a school: {}\n\n", int(self.min)));

        out.push_str("Color breakpoints (quintiles):\n");
        for (tier, low, high) in self.breakpoints.legend_ranges(self.max.unwrap_or(0)) {
            out.push_str(&format!("- {}: {}-{} teachers\n", tier.label(), low, high));
        }

        out.push_str(&format!("\nTop {} schools by teacher count:\n", TOP_N));
        if self.top.is_empty() {
            out.push_str("(none)\n");
            return out;
        }
        let id_width = self.top.iter().map(|t| t.school_id.len()).max().unwrap_or(0).max("school_id".len());
        let name_width = self.top.iter().map(|t| t.name.chars().count()).max().unwrap_or(0).max("name".len());
        out.push_str(&format!(
            "{:<id_width$}  {:<name_width$}  {:>13}\n",
            "school_id", "name", "teacher_count"
        ));
        for t in &self.top {
            out.push_str(&format!(
                "{:<id_width$}  {:<name_width$}  {:>13}\n",
                t.school_id, t.name, t.teacher_count
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Point;

    fn merged(key: &str, count: u32) -> MergedSchool {
        MergedSchool {
            key: key.to_string(),
            name: format!("School {}", key),
            location: Point::new(-73.9, 40.7),
            teacher_count: count,
        }
    }

    #[test]
    fn statistics_include_zero_counts() {
        let rows = [merged("A", 0), merged("B", 4), merged("C", 2), merged("D", 10)];
        let summary = Summary::from_merged(&rows, Breakpoints::from_counts(rows.iter().map(|m| m.teacher_count)));

        assert_eq!(summary.total_schools, 4);
        assert_eq!(summary.with_teachers, 3);
        assert_eq!(summary.without_teachers, 1);
        assert_eq!(summary.total_teachers, 16);
        assert_relative_eq!(summary.mean.unwrap(), 4.0);
        assert_relative_eq!(summary.median.unwrap(), 3.0);
        assert_eq!(summary.min, Some(0));
        assert_eq!(summary.max, Some(10));
    }

    #[test]
    fn top_list_is_capped_sorted_and_stable() {
        let mut rows: Vec<MergedSchool> = (1..=12).map(|i| merged(&format!("S{:02}", i), i)).collect();
        rows.push(merged("TIE", 12));
        rows.push(merged("ZERO", 0));
        let summary = Summary::from_merged(&rows, Breakpoints::default());

        assert_eq!(summary.top.len(), 10);
        assert_eq!(summary.top[0].school_id, "S12");
        assert_eq!(summary.top[1].school_id, "TIE");
        assert_eq!(summary.top[9].teacher_count, 4);
        assert!(summary.top.iter().all(|t| t.school_id != "ZERO"));
    }

    #[test]
    fn text_report_layout() {
        let rows = [merged("A", 3), merged("B", 0)];
        let text = Summary::from_merged(&rows, Breakpoints([3, 3, 3, 3])).render_text("Density");

        assert!(text.starts_with("Density\n=======\n\n"));
        assert!(text.contains("Total schools in dataset: 2\n"));
        assert!(text.contains("- Average teachers per school: 1.5\n"));
        assert!(text.contains("- Median teachers per school: 1.5\n"));
        assert!(text.contains("- Light yellow: 1-3 teachers\n"));
        assert!(text.contains("school_id  name      teacher_count\n"));
        assert!(text.ends_with("A          School A              3\n"));
    }

    #[test]
    fn empty_set_reports_na() {
        let text = Summary::from_merged(&[], Breakpoints::default()).render_text("Density");
        assert!(text.contains("- Average teachers per school: n/a"));
        assert!(text.contains("- Max teachers at a school: n/a"));
        assert!(text.contains("(none)"));
    }
}
