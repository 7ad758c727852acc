use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{CloudProvider, FindFilter, InstanceSpec, Outcome, ProviderError, ProviderInstance};

#[derive(Default)]
struct State {
    connect_failure: Option<ProviderError>,
    images: HashMap<(String, String), String>,
    request_spot_failure: Option<ProviderError>,
    queued_request_ids: Vec<String>,
    next_id_seq: u32,
    outcomes: HashMap<String, Outcome>,
    instances: Vec<ProviderInstance>,
    terminated: Vec<String>,
    request_spot_calls: Vec<InstanceSpec>,
}

/// Deterministic in-memory stand-in for a real cloud SDK. Every interaction
/// is scripted ahead of time through the setters below rather than
/// simulating real provider timing, so scenario tests stay reproducible
/// tick-to-tick.
pub struct MockProvider {
    state: Mutex<State>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn fail_connect(&self, err: ProviderError) {
        self.state.lock().unwrap().connect_failure = Some(err);
    }

    pub fn set_image(&self, region: &str, name: &str, image_id: &str) {
        self.state
            .lock()
            .unwrap()
            .images
            .insert((region.to_string(), name.to_string()), image_id.to_string());
    }

    pub fn fail_request_spot(&self, err: ProviderError) {
        self.state.lock().unwrap().request_spot_failure = Some(err);
    }

    /// Scripts the request ids the next `request_spot` call returns, in
    /// order. If the queue runs dry, ids are auto-generated as `sir-NNN`.
    pub fn queue_request_ids(&self, ids: impl IntoIterator<Item = String>) {
        self.state.lock().unwrap().queued_request_ids.extend(ids);
    }

    pub fn set_outcome(&self, request_id: &str, outcome: Outcome) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(request_id.to_string(), outcome);
    }

    pub fn push_instance(&self, instance: ProviderInstance) {
        self.state.lock().unwrap().instances.push(instance);
    }

    pub fn terminated_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().terminated.clone()
    }

    pub fn request_spot_calls(&self) -> Vec<InstanceSpec> {
        self.state.lock().unwrap().request_spot_calls.clone()
    }

    fn next_id(state: &mut State) -> String {
        if let Some(id) = state.queued_request_ids.pop() {
            return id;
        }
        state.next_id_seq += 1;
        format!("sir-{:03}", state.next_id_seq)
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn connect(&self, _region: &str, _credentials: &str) -> Result<(), ProviderError> {
        if let Some(err) = &self.state.lock().unwrap().connect_failure {
            return Err(err.clone());
        }
        Ok(())
    }

    async fn resolve_image(&self, region: &str, name: &str) -> Result<String, ProviderError> {
        let state = self.state.lock().unwrap();
        state
            .images
            .get(&(region.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ProviderError::Unclassified(format!("no image registered for {region}/{name}"))
            })
    }

    async fn request_spot(
        &self,
        _bid_total: f64,
        spec: &InstanceSpec,
        count: u32,
        _timeout_seconds: u64,
    ) -> Result<Vec<String>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.request_spot_failure.clone() {
            return Err(err);
        }
        state.request_spot_calls.push(spec.clone());
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(Self::next_id(&mut state));
        }
        Ok(ids)
    }

    async fn check_spot_requests(
        &self,
        request_ids: &[String],
        _tags: &HashMap<String, String>,
    ) -> Result<Vec<Outcome>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(request_ids
            .iter()
            .map(|id| state.outcomes.get(id).cloned().unwrap_or(Outcome::Pending))
            .collect())
    }

    async fn find(&self, filter: FindFilter) -> Result<Vec<ProviderInstance>, ProviderError> {
        let state = self.state.lock().unwrap();
        let matches = match filter {
            FindFilter::Tag { key, value } => state
                .instances
                .iter()
                .filter(|i| i.tags.get(&key).map(|v| v == &value).unwrap_or(false))
                .cloned()
                .collect(),
            FindFilter::InstanceIds(ids) => state
                .instances
                .iter()
                .filter(|i| ids.contains(&i.instance_id))
                .cloned()
                .collect(),
        };
        Ok(matches)
    }

    async fn terminate(&self, instances: &[ProviderInstance]) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        let ids: Vec<String> = instances.iter().map(|i| i.instance_id.clone()).collect();
        state.instances.retain(|i| !ids.contains(&i.instance_id));
        state.terminated.extend(ids);
        Ok(())
    }
}
