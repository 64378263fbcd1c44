//! One-way ANOVA of β across categorical groups (field types).

use std::collections::BTreeMap;

use crate::domain::AnovaSummary;
use crate::math::{f_sf, mean};

/// F test and η² for `values` grouped by `labels`.
///
/// None when there are fewer than two groups or no within-group degrees of freedom.
pub fn one_way_anova(values: &[f64], labels: &[String]) -> Option<AnovaSummary> {
    if values.len() != labels.len() {
        return None;
    }
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (v, label) in values.iter().zip(labels) {
        groups.entry(label.as_str()).or_default().push(*v);
    }

    let k = groups.len();
    let n = values.len();
    if k < 2 || n <= k {
        return None;
    }

    let grand = mean(values)?;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for members in groups.values() {
        let m = mean(members)?;
        ss_between += members.len() as f64 * (m - grand) * (m - grand);
        ss_within += members.iter().map(|v| (v - m) * (v - m)).sum::<f64>();
    }
    let ss_total = ss_between + ss_within;

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let f_statistic = if ss_within > 0.0 {
        (ss_between / df_between) / (ss_within / df_within)
    } else {
        f64::INFINITY
    };
    let p_value = if f_statistic.is_finite() {
        f_sf(f_statistic, df_between, df_within)
    } else {
        0.0
    };
    let eta_squared = if ss_total > 0.0 { ss_between / ss_total } else { 0.0 };

    Some(AnovaSummary {
        n_groups: k,
        f_statistic,
        p_value,
        eta_squared,
    })
}
