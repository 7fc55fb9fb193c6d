//! Multi-period problems and their solutions.
use itertools::Itertools;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::flow::{Flow, FlowProvider};
use crate::graph::Network;
use crate::switches::SwitchSettings;
use crate::topology::{NetworkConfiguration, Topology};
use crate::types::*;
use crate::{DnrError, DnrResult};

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

/// One time period with its own demands.
#[derive(Clone, Debug, PartialEq)]
pub struct Period {
    pub name: String,
    pub duration_hours: f64,
    /// Complex power demand per bus in kVA.
    pub demands: Vec<Complex>,
}

/// A network and the periods a switch plan has to serve.
#[derive(Clone, Debug)]
pub struct Problem {
    network: Arc<Network>,
    periods: Vec<Period>,
}

impl Problem {
    pub fn new(network: Arc<Network>, periods: Vec<Period>) -> DnrResult<Self> {
        if periods.is_empty() {
            return Err(DnrError::BadInput("A problem needs at least one period".to_string()));
        }
        for period in &periods {
            if period.demands.len() != network.bus_count() {
                return Err(DnrError::BadInput(format!(
                    "Period {} has {} demands for {} buses",
                    period.name,
                    period.demands.len(),
                    network.bus_count()
                )));
            }
            if !(period.duration_hours > 0.0) {
                return Err(DnrError::BadInput(format!(
                    "Period {} has non-positive duration",
                    period.name
                )));
            }
        }
        Ok(Problem { network, periods })
    }

    /// A problem with a single one-hour period.
    pub fn single_period(network: Arc<Network>, demands: Vec<Complex>) -> DnrResult<Self> {
        Self::new(
            network,
            vec![Period {
                name: "default".to_string(),
                duration_hours: 1.0,
                demands,
            }],
        )
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn period_count(&self) -> usize {
        self.periods.len()
    }
}

/// Flows of every period for one provider, computed at most once at a time.
type FlowSlot = Arc<Mutex<Option<Vec<Arc<dyn Flow>>>>>;

/// One network configuration per period of a problem.
pub struct Solution {
    problem: Arc<Problem>,
    periods: Vec<NetworkConfiguration>,
    /// Reference settings for switching costs.
    start: Vec<SwitchSettings>,
    /// Cached flows keyed by flow provider name.
    flows: Mutex<HashMap<String, FlowSlot>>,
}

impl Clone for Solution {
    fn clone(&self) -> Self {
        Solution {
            problem: Arc::clone(&self.problem),
            periods: self.periods.clone(),
            start: self.start.clone(),
            flows: Mutex::new(self.flows.lock().clone()),
        }
    }
}

impl std::fmt::Debug for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solution")
            .field("settings", &self.settings())
            .field("start", &self.start)
            .finish()
    }
}

impl Solution {
    /// A solution with the given settings per period, which also become the start settings.
    pub fn new(problem: Arc<Problem>, settings: Vec<SwitchSettings>) -> DnrResult<Self> {
        if settings.len() != problem.period_count() {
            return Err(DnrError::BadInput(format!(
                "{} settings given for {} periods",
                settings.len(),
                problem.period_count()
            )));
        }
        let periods = settings
            .iter()
            .map(|s| NetworkConfiguration::new(Arc::clone(problem.network()), s.clone()))
            .collect::<DnrResult<Vec<_>>>()?;
        Ok(Solution {
            problem,
            periods,
            start: settings,
            flows: Mutex::new(HashMap::new()),
        })
    }

    /// The same settings in every period.
    pub fn uniform(problem: Arc<Problem>, settings: SwitchSettings) -> DnrResult<Self> {
        let settings = vec![settings; problem.period_count()];
        Self::new(problem, settings)
    }

    pub fn problem(&self) -> &Arc<Problem> {
        &self.problem
    }

    pub fn network(&self) -> &Arc<Network> {
        self.problem.network()
    }

    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    pub fn configuration(&self, period: PeriodIndex) -> &NetworkConfiguration {
        &self.periods[period]
    }

    pub fn configurations(&self) -> &[NetworkConfiguration] {
        &self.periods
    }

    /// Mutable access to a period. Cached flows are dropped.
    pub fn configuration_mut(&mut self, period: PeriodIndex) -> &mut NetworkConfiguration {
        self.flows.get_mut().clear();
        &mut self.periods[period]
    }

    /// The topology of a period, which must have been rebuilt with [`Self::ensure_valid`].
    pub fn topology(&self, period: PeriodIndex) -> DnrResult<&Topology> {
        self.periods[period].valid_topology()
    }

    /// Rebuild the topology of every period.
    pub fn ensure_valid(&mut self) {
        self.periods
            .iter_mut()
            .for_each(NetworkConfiguration::ensure_valid);
    }

    pub fn settings(&self) -> Vec<SwitchSettings> {
        self.periods.iter().map(|c| c.settings().clone()).collect()
    }

    pub fn start_settings(&self) -> &[SwitchSettings] {
        &self.start
    }

    pub fn set_start_settings(&mut self, start: Vec<SwitchSettings>) -> DnrResult<()> {
        if start.len() != self.periods.len() {
            return Err(DnrError::BadInput(format!(
                "{} start settings given for {} periods",
                start.len(),
                self.periods.len()
            )));
        }
        self.start = start;
        Ok(())
    }

    /// Switching operations from the start settings into the first period and between
    /// consecutive periods.
    pub fn switching_operations(&self) -> usize {
        std::iter::once(&self.start[0])
            .chain(self.periods.iter().map(|config| config.settings()))
            .tuple_windows()
            .map(|(previous, next)| next.switching_distance(previous))
            .sum()
    }

    /// Flows of every period computed by `provider`, cached per provider.
    ///
    /// Concurrent callers asking for the same provider wait for a single computation.
    pub fn flows(&self, provider: &dyn FlowProvider) -> DnrResult<Vec<Arc<dyn Flow>>> {
        let slot = Arc::clone(
            self.flows
                .lock()
                .entry(provider.name().to_string())
                .or_default(),
        );
        let mut slot = slot.lock();
        if let Some(flows) = slot.as_ref() {
            return Ok(flows.clone());
        }
        let flows = self
            .periods
            .iter()
            .zip(self.problem.periods())
            .map(|(config, period)| {
                Ok(provider.compute_flow(config.valid_topology()?, &period.demands))
            })
            .collect::<DnrResult<Vec<_>>>()?;
        *slot = Some(flows.clone());
        Ok(flows)
    }

    /// Store flows computed elsewhere, e.g. disaggregated from an aggregate solution.
    pub fn install_flows(&self, provider_name: &str, flows: Vec<Arc<dyn Flow>>) -> DnrResult<()> {
        if flows.len() != self.periods.len() {
            return Err(DnrError::InvalidOperation(format!(
                "{} flows given for {} periods",
                flows.len(),
                self.periods.len()
            )));
        }
        self.flows
            .lock()
            .insert(provider_name.to_string(), Arc::new(Mutex::new(Some(flows))));
        Ok(())
    }

    /// True if flows of the provider are cached.
    pub fn has_flows(&self, provider_name: &str) -> bool {
        self.flows
            .lock()
            .get(provider_name)
            .map_or(false, |slot| slot.lock().is_some())
    }

    pub fn clear_flows(&mut self) {
        self.flows.get_mut().clear();
    }
}
