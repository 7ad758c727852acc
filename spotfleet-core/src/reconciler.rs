use std::collections::{HashMap, HashSet};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use spotfleet_common::{
    cores_for_instance_type, strip_provider_code, Instance, InstanceStatus, PoolConfiguration,
    PoolStatusType, STATUS_REQUESTED,
};
use spotfleet_providers::{
    CloudProvider, FindFilter, InstanceSpec, Outcome, ProviderError, ProviderInstance,
    TerminalState, TransientState,
};

use crate::cache::{Cache, CacheError};
use crate::lock::PoolLock;
use crate::region_selector;
use crate::status::StatusReporter;
use crate::store::{Store, StoreError};

const SPOTMGR_POOL_TAG: &str = "SpotManager-PoolId";
const SPOTMGR_UPDATABLE_TAG: &str = "SpotManager-Updatable";
const SPOT_REQUEST_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("lock io error: {0}")]
    Lock(#[from] std::io::Error),
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

/// Entry point. The only surface this crate exposes to a scheduler — all
/// persistence, HTTP, CLI, and credential handling belong to collaborators
/// outside this crate.
pub async fn reconcile(
    pool_id: Uuid,
    store: &dyn Store,
    provider: &dyn CloudProvider,
    cache: &dyn Cache,
    lock: &PoolLock,
    credentials: &str,
) -> Result<(), ReconcileError> {
    let Some(_guard) = lock.try_acquire(pool_id)? else {
        info!(%pool_id, "pool lock held elsewhere this tick, skipping");
        return Ok(());
    };

    let reporter = StatusReporter::new(store);

    let Some(pool) = store.load_pool(pool_id).await? else {
        warn!(%pool_id, "pool not found, skipping");
        return Ok(());
    };

    if reporter.is_frozen(pool_id).await? {
        info!(%pool_id, "pool is frozen, skipping scale actions");
        return Ok(());
    }

    let config = pool.config.0.clone();
    if let Err(err) = config.validate() {
        reporter
            .report(
                pool_id,
                PoolStatusType::ConfigError,
                &err.to_string(),
                true,
            )
            .await?;
        return Ok(());
    }

    update_pool_instances(pool_id, &config, store, provider, cache, &reporter, credentials).await?;

    let (instances, cores_present) =
        reconcile_capacity(pool_id, store, &reporter).await?;
    let cores_missing = config.size as i64 - cores_present as i64;

    if !pool.enabled {
        terminate_pool_instances(pool_id, &instances, provider, &reporter, true, credentials).await?;
        return Ok(());
    }

    let now = Utc::now();
    if pool.is_stale(now) {
        store.set_last_cycled(pool_id, now).await?;
        terminate_pool_instances(pool_id, &instances, provider, &reporter, true, credentials).await?;
        return Ok(());
    }

    if cores_missing > 0 {
        start_pool_instances(
            pool_id,
            &config,
            cores_missing as u32,
            store,
            provider,
            cache,
            &reporter,
            credentials,
        )
        .await?;
    } else if cores_missing < 0 {
        let to_terminate = select_scale_down(&instances, (-cores_missing) as u32);
        if !to_terminate.is_empty() {
            terminate_pool_instances(pool_id, &to_terminate, provider, &reporter, false, credentials).await?;
        }
    }

    Ok(())
}

/// Applies the 256-offset healer and the unknown-code defensive path, then
/// deletes any instance whose stripped code is terminal. Returns the
/// surviving instances and their summed cores.
async fn reconcile_capacity(
    pool_id: Uuid,
    store: &dyn Store,
    reporter: &StatusReporter<'_>,
) -> Result<(Vec<Instance>, u32), ReconcileError> {
    let instances = store.list_instances(pool_id).await?;
    let mut kept = Vec::new();
    let mut cores_present: u32 = 0;

    for mut instance in instances {
        let raw = instance.status_code;
        let status = match InstanceStatus::from_code(raw) {
            Some(status) => status,
            None if raw >= 256 => {
                // Recovery from a prior storage bug: a legitimate provider
                // code should never have the 256 offset added to it.
                let healed = raw - 256;
                match InstanceStatus::from_code(healed) {
                    Some(status) => {
                        instance.status_code = healed;
                        status
                    }
                    None => {
                        warn!(
                            pool_id = %pool_id,
                            instance_id = %instance.id,
                            raw_code = raw,
                            "unrecognized status code even after un-offsetting, forcing to pending",
                        );
                        instance.status_code = spotfleet_common::STATUS_PENDING;
                        store.update_instance(&instance).await?;
                        InstanceStatus::Pending
                    }
                }
            }
            None => {
                warn!(
                    pool_id = %pool_id,
                    instance_id = %instance.id,
                    raw_code = raw,
                    "unrecognized status code, forcing to pending",
                );
                instance.status_code = spotfleet_common::STATUS_PENDING;
                store.update_instance(&instance).await?;
                InstanceStatus::Pending
            }
        };

        if status.is_terminal() {
            store.delete_instance(instance.id).await?;
            continue;
        }

        if status.counts_toward_capacity() {
            cores_present += instance.size;
        }
        kept.push(instance);
    }

    let _ = reporter; // reserved for future capacity-related status entries
    Ok((kept, cores_present))
}

/// Update-from-provider. After this call, the store accurately reflects the
/// provider's view for this pool, modulo still-`requested` instances the
/// provider has not yet fulfilled.
async fn update_pool_instances(
    pool_id: Uuid,
    config: &PoolConfiguration,
    store: &dyn Store,
    provider: &dyn CloudProvider,
    cache: &dyn Cache,
    reporter: &StatusReporter<'_>,
    credentials: &str,
) -> Result<(), ReconcileError> {
    let instances = store.list_instances(pool_id).await?;
    let mut by_region: HashMap<String, Vec<Instance>> = HashMap::new();
    for instance in instances {
        by_region
            .entry(instance.ec2_region.clone())
            .or_default()
            .push(instance);
    }

    let mut instances_created = false;

    for (region, region_instances) in &by_region {
        if let Err(err) = provider.connect(region, credentials).await {
            reporter
                .report(
                    pool_id,
                    PoolStatusType::Unclassified,
                    &format!("connect to {region} failed: {err}"),
                    true,
                )
                .await?;
            continue;
        }

        let requested: Vec<&Instance> =
            region_instances.iter().filter(|i| i.is_requested()).collect();
        if !requested.is_empty() {
            let request_ids: Vec<String> =
                requested.iter().map(|i| i.ec2_instance_id.clone()).collect();
            // Set pool tags here too, in case the provider applies tags to a
            // spot request the moment it is observed as fulfilled — without
            // PoolId on that first sighting, the find() below would never
            // pick the instance back up.
            let mut tags = config.ec2_tags.clone();
            tags.insert(SPOTMGR_POOL_TAG.to_string(), pool_id.to_string());
            tags.insert(SPOTMGR_UPDATABLE_TAG.to_string(), "1".to_string());

            match provider.check_spot_requests(&request_ids, &tags).await {
                Ok(outcomes) => {
                    for (request_id, outcome) in request_ids.iter().zip(outcomes) {
                        apply_spot_outcome(
                            pool_id,
                            request_id,
                            outcome,
                            store,
                            cache,
                            &mut instances_created,
                        )
                        .await?;
                    }
                }
                Err(err) => {
                    report_provider_error(pool_id, err, reporter).await?;
                    continue;
                }
            }
        }

        // Re-load this region's instances: the requested-to-fulfilled
        // rewrite above may have changed ids.
        let local_now: Vec<Instance> = store
            .list_instances(pool_id)
            .await?
            .into_iter()
            .filter(|i| &i.ec2_region == region)
            .collect();
        // Mirrors `instances_left`: every non-`requested` local instance
        // starts "to be reaped" and is struck off as the provider confirms
        // it still exists.
        let mut instances_left: HashSet<Uuid> = local_now
            .iter()
            .filter(|i| !i.is_requested())
            .map(|i| i.id)
            .collect();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut not_updatable_foreign: HashSet<String> = HashSet::new();
        let mut not_in_region: HashMap<String, i32> = HashMap::new();

        let provider_instances = match provider
            .find(FindFilter::Tag {
                key: SPOTMGR_POOL_TAG.to_string(),
                value: pool_id.to_string(),
            })
            .await
        {
            Ok(found) => found,
            Err(err) => {
                report_provider_error(pool_id, err, reporter).await?;
                continue;
            }
        };

        for provider_instance in &provider_instances {
            seen_ids.insert(provider_instance.instance_id.clone());
            let updatable = provider_instance
                .tags
                .get(SPOTMGR_UPDATABLE_TAG)
                .map(|v| v.parse::<i64>().unwrap_or(0) > 0)
                .unwrap_or(false);
            if !updatable {
                // A spawner elsewhere still owns this instance. Protect it
                // from the reaper below if we already know it locally; it
                // is simply not ours to touch yet either way.
                if let Some(local) = local_now
                    .iter()
                    .find(|i| i.ec2_instance_id == provider_instance.instance_id)
                {
                    instances_left.remove(&local.id);
                } else {
                    not_updatable_foreign.insert(provider_instance.instance_id.clone());
                }
                continue;
            }

            let stripped = strip_provider_code(provider_instance.state_code);

            match local_now
                .iter()
                .find(|i| i.ec2_instance_id == provider_instance.instance_id)
            {
                Some(local) => {
                    instances_left.remove(&local.id);
                    if local.status_code != stripped || local.hostname.is_none() {
                        let mut updated = local.clone();
                        updated.status_code = stripped;
                        if updated.hostname.is_none() {
                            updated.hostname = provider_instance.hostname.clone();
                        }
                        store.update_instance(&updated).await?;
                    }
                }
                None => {
                    let already_gone = InstanceStatus::from_code(stripped)
                        .map(|s| s.is_terminal())
                        .unwrap_or(false);
                    if !already_gone
                        && store
                            .find_instance_by_ec2_id(pool_id, &provider_instance.instance_id)
                            .await?
                            .is_none()
                    {
                        return Err(ReconcileError::Inconsistent(format!(
                            "provider instance {} tagged for pool {pool_id} has no local record",
                            provider_instance.instance_id,
                        )));
                    }
                    not_in_region.insert(provider_instance.instance_id.clone(), stripped);
                }
            }
        }

        // Reap: any local instance not observed above is gone from the
        // provider's perspective and is deleted, with a reason assembled
        // from the three debug sets.
        for local in &local_now {
            if !instances_left.contains(&local.id) {
                continue;
            }
            let mut reasons = Vec::new();
            if !seen_ids.contains(&local.ec2_instance_id) {
                reasons.push("no corresponding machine on provider".to_string());
            }
            if not_updatable_foreign.contains(&local.ec2_instance_id) {
                reasons.push("not updatable".to_string());
            }
            if let Some(code) = not_in_region.get(&local.ec2_instance_id) {
                reasons.push(format!("has state code {code} on provider but not in our region"));
            }
            if reasons.is_empty() {
                reasons.push("?".to_string());
            }
            warn!(pool_id = %pool_id, instance_id = %local.id, reasons = %reasons.join(", "), "reaping instance");
            store.delete_instance(local.id).await?;
        }
    }

    if instances_created {
        reporter
            .clear(pool_id, PoolStatusType::MaxSpotInstanceCountExceeded)
            .await?;
        reporter.clear(pool_id, PoolStatusType::TemporaryFailure).await?;
    }

    Ok(())
}

async fn apply_spot_outcome(
    pool_id: Uuid,
    request_id: &str,
    outcome: Outcome,
    store: &dyn Store,
    cache: &dyn Cache,
    instances_created: &mut bool,
) -> Result<(), ReconcileError> {
    let Some(mut instance) = store.find_instance_by_ec2_id(pool_id, request_id).await? else {
        return Ok(());
    };

    match outcome {
        Outcome::Fulfilled {
            instance_id,
            hostname,
            state_code,
        } => {
            instance.ec2_instance_id = instance_id;
            instance.hostname = hostname;
            instance.status_code = strip_provider_code(state_code);
            store.update_instance(&instance).await?;
            *instances_created = true;
        }
        Outcome::Terminal {
            state: TerminalState::Cancelled | TerminalState::Closed,
            ..
        } => {
            cache
                .blacklist(&instance.ec2_zone, &instance.ec2_instance_type)
                .await?;
            store.delete_instance(instance.id).await?;
        }
        Outcome::Terminal {
            state: TerminalState::Failed,
            ..
        } => {
            let reporter = StatusReporter::new(store);
            reporter
                .report(
                    pool_id,
                    PoolStatusType::Unclassified,
                    &format!("spot request {request_id} failed"),
                    true,
                )
                .await?;
            store.delete_instance(instance.id).await?;
        }
        Outcome::Transient {
            state: TransientState::Open | TransientState::Active,
        } => {
            warn!(pool_id = %pool_id, request_id, "spot request still open/active, leaving as-is");
        }
        Outcome::Pending => {}
    }

    Ok(())
}

async fn report_provider_error(
    pool_id: Uuid,
    err: ProviderError,
    reporter: &StatusReporter<'_>,
) -> Result<(), ReconcileError> {
    match err {
        ProviderError::QuotaExceeded(msg) => {
            reporter
                .report(pool_id, PoolStatusType::MaxSpotInstanceCountExceeded, &msg, false)
                .await?
        }
        ProviderError::TransientFailure(msg) => {
            reporter
                .report(pool_id, PoolStatusType::TemporaryFailure, &msg, false)
                .await?
        }
        ProviderError::Unclassified(msg) => {
            reporter
                .report(pool_id, PoolStatusType::Unclassified, &msg, true)
                .await?
        }
    }
    Ok(())
}

/// Scale-up.
async fn start_pool_instances(
    pool_id: Uuid,
    config: &PoolConfiguration,
    cores_missing: u32,
    store: &dyn Store,
    provider: &dyn CloudProvider,
    cache: &dyn Cache,
    reporter: &StatusReporter<'_>,
    credentials: &str,
) -> Result<(), ReconcileError> {
    let acceptable: Vec<&String> = config
        .ec2_instance_types
        .iter()
        .filter(|t| cores_for_instance_type(t).map(|c| c <= cores_missing).unwrap_or(false))
        .collect();
    let candidates: Vec<&String> = if acceptable.is_empty() {
        let min_cores = config
            .ec2_instance_types
            .iter()
            .filter_map(|t| cores_for_instance_type(t))
            .min();
        match min_cores {
            Some(min_cores) => config
                .ec2_instance_types
                .iter()
                .filter(|t| cores_for_instance_type(t) == Some(min_cores))
                .collect(),
            None => return Ok(()),
        }
    } else {
        acceptable
    };

    let mut restricted_config = config.clone();
    restricted_config.ec2_instance_types = candidates.into_iter().cloned().collect();

    let selection = match region_selector::select(&restricted_config, cache).await {
        Ok(selection) => selection,
        Err(err) => {
            warn!(pool_id = %pool_id, %err, "region selector cache error, retrying next tick");
            return Ok(());
        }
    };

    let Some((region, zone, instance_type)) = selection.winner else {
        let rejected_msg = selection
            .rejected
            .iter()
            .map(|(zone, price)| format!("{zone} at {price}"))
            .collect::<Vec<_>>()
            .join(", ");
        reporter
            .report(
                pool_id,
                PoolStatusType::PriceTooLow,
                &format!("no region/zone qualified; rejected: {rejected_msg}"),
                false,
            )
            .await?;
        return Ok(());
    };
    reporter.clear(pool_id, PoolStatusType::PriceTooLow).await?;

    let cores = cores_for_instance_type(&instance_type).unwrap_or(1);
    let instance_count = std::cmp::max(1, cores_missing / cores);

    let userdata = match render_userdata(config, pool_id) {
        Ok(userdata) => userdata,
        Err(err) => {
            reporter
                .report(pool_id, PoolStatusType::ConfigError, &err, true)
                .await?;
            return Ok(());
        }
    };

    if let Err(err) = provider.connect(&region, credentials).await {
        report_provider_error(pool_id, err, reporter).await?;
        return Ok(());
    }
    let image_id = match resolve_image(&region, &config.ec2_image_name, provider, cache).await? {
        Ok(image_id) => image_id,
        Err(err) => {
            report_provider_error(pool_id, err, reporter).await?;
            return Ok(());
        }
    };
    let descriptor = render_boot_descriptor(config, &image_id);

    let mut tags = config.ec2_tags.clone();
    tags.insert(SPOTMGR_POOL_TAG.to_string(), pool_id.to_string());

    let spec = InstanceSpec {
        region: region.clone(),
        zone: zone.clone(),
        instance_type: instance_type.clone(),
        image_id: descriptor_string(&descriptor, "image_id").unwrap_or(image_id),
        key_name: descriptor_string(&descriptor, "key_name").or_else(|| config.ec2_key_name.clone()),
        security_groups: descriptor_string_array(&descriptor, "security_groups")
            .unwrap_or_else(|| config.ec2_security_groups.clone()),
        userdata,
        tags,
    };
    let bid_total = config.ec2_max_price * cores as f64;

    match provider
        .request_spot(bid_total, &spec, instance_count, SPOT_REQUEST_TIMEOUT_SECS)
        .await
    {
        Ok(request_ids) => {
            for request_id in request_ids {
                let instance = Instance {
                    id: Uuid::new_v4(),
                    pool_id,
                    ec2_instance_id: request_id,
                    ec2_region: region.clone(),
                    ec2_zone: zone.clone(),
                    ec2_instance_type: instance_type.clone(),
                    hostname: None,
                    size: cores,
                    status_code: STATUS_REQUESTED,
                    created: Utc::now(),
                };
                // Persisted before continuing so a crash will not lose
                // track of an issued bid.
                store.insert_instance(&instance).await?;
            }
        }
        Err(err) => report_provider_error(pool_id, err, reporter).await?,
    }

    Ok(())
}

fn render_userdata(config: &PoolConfiguration, pool_id: Uuid) -> Result<Vec<u8>, String> {
    let mut macros = config.ec2_userdata_macros.clone();
    macros.insert("EC2SPOTMANAGER_POOLID".to_string(), pool_id.to_string());
    macros.insert(
        "EC2SPOTMANAGER_CYCLETIME".to_string(),
        config.cycle_interval.to_string(),
    );

    let mut text = String::from_utf8(config.ec2_userdata.clone())
        .map_err(|err| format!("userdata is not valid utf-8: {err}"))?;
    for (key, value) in &macros {
        text = text.replace(&format!("@{key}@"), value);
    }
    Ok(text.into_bytes())
}

/// Merges the explicit `key_name`/`image_name`/`security_groups` fields
/// (prefix stripped) with `ec2_raw_config`, raw config winning on key
/// collisions. The result is what actually gets sent to the provider,
/// so an operator can override or extend any of these three fields per
/// pool without this crate needing to model every provider's quirks.
fn render_boot_descriptor(
    config: &PoolConfiguration,
    image_id: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut descriptor = serde_json::Map::new();
    descriptor.insert("image_id".to_string(), serde_json::Value::String(image_id.to_string()));
    if let Some(key_name) = &config.ec2_key_name {
        descriptor.insert("key_name".to_string(), serde_json::Value::String(key_name.clone()));
    }
    descriptor.insert(
        "security_groups".to_string(),
        serde_json::Value::Array(
            config
                .ec2_security_groups
                .iter()
                .cloned()
                .map(serde_json::Value::String)
                .collect(),
        ),
    );
    for (key, value) in &config.ec2_raw_config {
        descriptor.insert(key.clone(), value.clone());
    }
    descriptor
}

fn descriptor_string(descriptor: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    descriptor.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn descriptor_string_array(
    descriptor: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<Vec<String>> {
    descriptor.get(key).and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

/// Outer `Result` is cache I/O, fatal to the tick. Inner `Result` is the
/// provider's resolve call, which the caller reports and aborts this pool's
/// scale-up for rather than falling back to a fabricated image id.
async fn resolve_image(
    region: &str,
    image_name: &str,
    provider: &dyn CloudProvider,
    cache: &dyn Cache,
) -> Result<Result<String, ProviderError>, ReconcileError> {
    if let Some(cached) = cache.cached_ami(region, image_name).await? {
        return Ok(Ok(cached));
    }
    let image_id = match provider.resolve_image(region, image_name).await {
        Ok(image_id) => image_id,
        Err(err) => return Ok(Err(err)),
    };
    cache.cache_ami(region, image_name, &image_id).await?;
    Ok(Ok(image_id))
}

/// Scale-down selection: oldest-first, refusing to overshoot.
fn select_scale_down(instances: &[Instance], mut deficit: u32) -> Vec<Instance> {
    let mut selected = Vec::new();
    for instance in instances {
        if deficit == 0 {
            break;
        }
        if instance.size <= deficit {
            deficit -= instance.size;
            selected.push(instance.clone());
        }
    }
    selected
}

/// Termination, including the disabled/cycled `terminateByPool` path.
async fn terminate_pool_instances(
    pool_id: Uuid,
    instances: &[Instance],
    provider: &dyn CloudProvider,
    reporter: &StatusReporter<'_>,
    terminate_by_pool: bool,
    credentials: &str,
) -> Result<(), ReconcileError> {
    let mut by_region: HashMap<String, Vec<Instance>> = HashMap::new();
    for instance in instances {
        by_region
            .entry(instance.ec2_region.clone())
            .or_default()
            .push(instance.clone());
    }

    for (region, region_instances) in by_region {
        if let Err(err) = provider.connect(&region, credentials).await {
            reporter
                .report(pool_id, PoolStatusType::Unclassified, &err.to_string(), true)
                .await?;
            return Ok(());
        }

        let targets: Result<Vec<ProviderInstance>, ProviderError> = if terminate_by_pool {
            provider
                .find(FindFilter::Tag {
                    key: SPOTMGR_POOL_TAG.to_string(),
                    value: pool_id.to_string(),
                })
                .await
        } else {
            let ids: Vec<String> = region_instances
                .iter()
                .map(|i| i.ec2_instance_id.clone())
                .collect();
            provider.find(FindFilter::InstanceIds(ids)).await
        };

        let targets = match targets {
            Ok(targets) => targets,
            Err(err) => {
                reporter
                    .report(pool_id, PoolStatusType::Unclassified, &err.to_string(), true)
                    .await?;
                return Ok(());
            }
        };

        if terminate_by_pool {
            for target in &targets {
                let known_locally = region_instances
                    .iter()
                    .any(|i| i.ec2_instance_id == target.instance_id);
                let stripped = strip_provider_code(target.state_code);
                let already_gone = InstanceStatus::from_code(stripped)
                    .map(|s| s.is_terminal())
                    .unwrap_or(false);
                if !known_locally && !already_gone {
                    warn!(
                        pool_id = %pool_id,
                        instance_id = %target.instance_id,
                        "provider instance tagged for pool is neither locally known nor already terminating",
                    );
                }
            }
        }

        if let Err(err) = provider.terminate(&targets).await {
            reporter
                .report(pool_id, PoolStatusType::Unclassified, &err.to_string(), true)
                .await?;
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn base_config() -> PoolConfiguration {
        PoolConfiguration {
            size: 8,
            cycle_interval: 3600,
            ec2_allowed_regions: ["us-east-1".to_string()].into_iter().collect(),
            ec2_instance_types: vec!["c4.xlarge".to_string()],
            ec2_max_price: 0.1,
            ec2_key_name: Some("default-key".to_string()),
            ec2_image_name: "ami-base".to_string(),
            ec2_security_groups: vec!["sg-default".to_string()],
            ec2_tags: StdHashMap::new(),
            ec2_userdata: vec![],
            ec2_userdata_macros: StdHashMap::new(),
            ec2_raw_config: serde_json::Map::new(),
        }
    }

    #[test]
    fn raw_config_overrides_explicit_fields() {
        let mut config = base_config();
        config.ec2_raw_config.insert(
            "key_name".to_string(),
            serde_json::Value::String("overridden-key".to_string()),
        );
        let descriptor = render_boot_descriptor(&config, "ami-resolved");
        assert_eq!(descriptor_string(&descriptor, "key_name"), Some("overridden-key".to_string()));
        assert_eq!(descriptor_string(&descriptor, "image_id"), Some("ami-resolved".to_string()));
    }

    #[test]
    fn explicit_fields_survive_when_raw_config_silent() {
        let config = base_config();
        let descriptor = render_boot_descriptor(&config, "ami-resolved");
        assert_eq!(descriptor_string(&descriptor, "key_name"), Some("default-key".to_string()));
        assert_eq!(
            descriptor_string_array(&descriptor, "security_groups"),
            Some(vec!["sg-default".to_string()])
        );
    }
}
