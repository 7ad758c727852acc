use std::collections::HashMap;

use spotfleet_common::{cores_for_instance_type, PoolConfiguration};

use crate::cache::{Cache, CacheError};

/// The winning `(region, zone, instance_type)` triple, or `None` if nothing
/// qualified. `rejected` always reports the minimum rejected per-core price
/// seen for each zone that was considered and priced too high.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub winner: Option<(String, String, String)>,
    pub rejected: HashMap<String, f64>,
}

fn median(mut prices: Vec<f64>) -> f64 {
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = prices.len();
    if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    }
}

/// Pure selection algorithm over already-fetched cache contents. Separated
/// from [`select`] so the core logic can be exercised without a Redis
/// connection.
pub fn select_from_series(
    config: &PoolConfiguration,
    series_by_type: &[(String, super::cache::PriceSeries)],
    is_blacklisted: impl Fn(&str, &str) -> bool,
) -> SelectionResult {
    let mut rejected: HashMap<String, f64> = HashMap::new();
    let mut best: Option<(f64, (String, String, String))> = None;

    // Iterate instance types in configuration order and regions/zones in
    // lexicographic cache order, so the tie-break ("first seen at the
    // current best median wins") is reproducible across restarts.
    for (instance_type, series) in series_by_type {
        let Some(cores) = cores_for_instance_type(instance_type) else {
            continue;
        };
        let mut regions: Vec<&String> = series.keys().collect();
        regions.sort();
        for region in regions {
            if !config.ec2_allowed_regions.contains(region) {
                continue;
            }
            let mut zones: Vec<&String> = series[region].keys().collect();
            zones.sort();
            for zone in zones {
                if is_blacklisted(zone, instance_type) {
                    continue;
                }
                let samples = &series[region][zone];
                if samples.is_empty() {
                    continue;
                }
                let per_core: Vec<f64> = samples.iter().map(|p| p / cores as f64).collect();
                if per_core[0] > config.ec2_max_price {
                    let entry = rejected.entry(zone.clone()).or_insert(per_core[0]);
                    if per_core[0] < *entry {
                        *entry = per_core[0];
                    }
                    continue;
                }
                let candidate_median = median(per_core);
                let better = match &best {
                    None => true,
                    Some((best_median, _)) => candidate_median < *best_median,
                };
                if better {
                    best = Some((
                        candidate_median,
                        (region.clone(), zone.clone(), instance_type.clone()),
                    ));
                }
            }
        }
    }

    SelectionResult {
        winner: best.map(|(_, triple)| triple),
        rejected,
    }
}

/// Fetches price series for each configured instance type from the cache
/// and runs [`select_from_series`] over the result.
pub async fn select(
    config: &PoolConfiguration,
    cache: &dyn Cache,
) -> Result<SelectionResult, CacheError> {
    let mut series_by_type = Vec::new();
    for instance_type in &config.ec2_instance_types {
        match cache.price_series(instance_type).await {
            Ok(Some(series)) => series_by_type.push((instance_type.clone(), series)),
            Ok(None) => {
                tracing::warn!(instance_type, "no cached price data, skipping");
            }
            Err(err) => {
                tracing::warn!(instance_type, %err, "malformed price data, skipping");
            }
        }
    }

    let mut blacklisted = HashMap::new();
    for (instance_type, series) in &series_by_type {
        for zones in series.values() {
            for zone in zones.keys() {
                let key = (zone.clone(), instance_type.clone());
                if let std::collections::hash_map::Entry::Vacant(e) = blacklisted.entry(key.clone()) {
                    e.insert(cache.is_blacklisted(zone, instance_type).await?);
                }
            }
        }
    }

    Ok(select_from_series(config, &series_by_type, |zone, itype| {
        blacklisted
            .get(&(zone.to_string(), itype.to_string()))
            .copied()
            .unwrap_or(false)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(types: Vec<&str>, max_price: f64) -> PoolConfiguration {
        PoolConfiguration {
            size: 8,
            cycle_interval: 3600,
            ec2_allowed_regions: ["us-east-1".to_string()].into_iter().collect(),
            ec2_instance_types: types.into_iter().map(String::from).collect(),
            ec2_max_price: max_price,
            ec2_key_name: None,
            ec2_image_name: "ami-base".to_string(),
            ec2_security_groups: vec![],
            ec2_tags: HashMap::new(),
            ec2_userdata: vec![],
            ec2_userdata_macros: HashMap::new(),
            ec2_raw_config: serde_json::Map::new(),
        }
    }

    fn series(region: &str, zone: &str, prices: Vec<f64>) -> super::super::cache::PriceSeries {
        HashMap::from([(region.to_string(), HashMap::from([(zone.to_string(), prices)]))])
    }

    #[test]
    fn scenario_empty_pool_scale_up_picks_cheaper_per_core_type() {
        let config = config(vec!["c4.large", "c4.xlarge"], 0.10);
        let series_by_type = vec![
            (
                "c4.large".to_string(),
                series("us-east-1", "us-east-1a", vec![0.03, 0.04]),
            ),
            (
                "c4.xlarge".to_string(),
                series("us-east-1", "us-east-1a", vec![0.05, 0.06, 0.05]),
            ),
        ];
        let result = select_from_series(&config, &series_by_type, |_, _| false);
        assert_eq!(
            result.winner,
            Some((
                "us-east-1".to_string(),
                "us-east-1a".to_string(),
                "c4.xlarge".to_string()
            ))
        );
    }

    #[test]
    fn scenario_price_too_high_rejects_and_reports_minimum() {
        let config = config(vec!["c4.xlarge"], 0.10);
        let series_by_type = vec![(
            "c4.xlarge".to_string(),
            series("us-east-1", "us-east-1a", vec![0.50, 0.51]),
        )];
        let result = select_from_series(&config, &series_by_type, |_, _| false);
        assert_eq!(result.winner, None);
        assert_eq!(result.rejected.get("us-east-1a"), Some(&0.125));
    }

    #[test]
    fn blacklisted_zone_is_skipped() {
        let config = config(vec!["c4.xlarge"], 0.10);
        let series_by_type = vec![(
            "c4.xlarge".to_string(),
            series("us-east-1", "us-east-1a", vec![0.02]),
        )];
        let result = select_from_series(&config, &series_by_type, |_, _| true);
        assert_eq!(result.winner, None);
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn disallowed_region_is_skipped() {
        let mut config = config(vec!["c4.xlarge"], 0.10);
        config.ec2_allowed_regions = HashSet::from(["us-west-2".to_string()]);
        let series_by_type = vec![(
            "c4.xlarge".to_string(),
            series("us-east-1", "us-east-1a", vec![0.02]),
        )];
        let result = select_from_series(&config, &series_by_type, |_, _| false);
        assert_eq!(result.winner, None);
    }

    #[test]
    fn empty_cache_returns_no_winner_and_no_rejections() {
        let config = config(vec!["c4.xlarge"], 0.10);
        let result = select_from_series(&config, &[], |_, _| false);
        assert_eq!(result.winner, None);
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn median_handles_even_length_series() {
        assert_eq!(median(vec![0.01, 0.03, 0.02, 0.04]), 0.025);
    }
}
