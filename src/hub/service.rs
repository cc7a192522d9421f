//! Hub network with live committed capacity.

use std::collections::{BTreeMap, HashSet};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::graph::{HubRouteGraph, OptimizeFor, PathQuery, PathResult};
use crate::config::HubConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::models::{HubId, ServiceLevel};
use crate::ports::HubStore;

const EPS: f64 = 1e-9;

/// Capacity snapshot of one hub.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HubCapacity {
    pub hub_id: HubId,
    pub daily_capacity: f64,
    pub committed_today: f64,
    pub utilization: f64,
}

/// A transfer hub that keeps a consignment off congested hubs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeHub {
    pub hub_id: HubId,
    /// Full path origin → hub → destination.
    pub path: PathResult,
    /// Path objective minus the direct path's.
    pub incremental_cost: f64,
    /// Utilization of the transfer hub once the demand is committed.
    pub utilization_after: f64,
}

/// One capacity transfer made by [`HubRoutingService::rebalance_hub_loads`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubTransfer {
    pub from: HubId,
    pub to: HubId,
    pub amount: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub moves: Vec<HubTransfer>,
    pub spread_before: f64,
    pub spread_after: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy)]
struct HubLoad {
    daily_capacity: f64,
    committed: f64,
}

impl HubLoad {
    fn utilization(&self) -> f64 {
        if self.daily_capacity > 0.0 {
            self.committed / self.daily_capacity
        } else {
            1.0
        }
    }

    fn spare(&self) -> f64 {
        (self.daily_capacity - self.committed).max(0.0)
    }
}

/// Path queries plus per-hub committed capacity.
///
/// Every hub's load sits behind its own lock. Operations touching several
/// hubs take the locks in ascending hub id order.
///
/// # Examples
///
/// ```
/// use u_dispatch::config::HubConfig;
/// use u_dispatch::hub::{HubRouteGraph, HubRoutingService};
/// use u_dispatch::models::{GeoPoint, HubNode};
///
/// let graph = HubRouteGraph::new(vec![HubNode::new(1, GeoPoint::new(0.0, 0.0), 100.0)], vec![])
///     .unwrap();
/// let service = HubRoutingService::new(graph, HubConfig::default()).unwrap();
///
/// service.commit_capacity(1, 40.0).unwrap();
/// assert_eq!(service.get_hub_capacity(1).unwrap().utilization, 0.4);
/// assert!(service.commit_capacity(1, 70.0).is_err());
/// ```
#[derive(Debug)]
pub struct HubRoutingService {
    graph: HubRouteGraph,
    loads: BTreeMap<HubId, Mutex<HubLoad>>,
    config: HubConfig,
}

impl HubRoutingService {
    /// Fails with [`DispatchError::Config`] when `config` does not validate.
    pub fn new(graph: HubRouteGraph, config: HubConfig) -> DispatchResult<Self> {
        config.validate()?;
        let loads = graph
            .hubs()
            .map(|h| {
                (
                    h.id,
                    Mutex::new(HubLoad {
                        daily_capacity: h.daily_capacity,
                        committed: h.committed_today,
                    }),
                )
            })
            .collect();
        Ok(Self {
            graph,
            loads,
            config,
        })
    }

    /// Reads hubs and lanes from the store.
    pub fn from_store(store: &dyn HubStore, config: HubConfig) -> DispatchResult<Self> {
        let graph = HubRouteGraph::new(store.hubs()?, store.lanes()?)?;
        Self::new(graph, config)
    }

    pub fn graph(&self) -> &HubRouteGraph {
        &self.graph
    }

    pub fn find_optimal_route(
        &self,
        origin: HubId,
        dest: HubId,
        service_level: ServiceLevel,
        query: &PathQuery,
    ) -> DispatchResult<PathResult> {
        self.graph.find_optimal_route(origin, dest, service_level, query)
    }

    pub fn get_hub_capacity(&self, hub_id: HubId) -> DispatchResult<HubCapacity> {
        let load = *self.load(hub_id)?.lock();
        Ok(snapshot(hub_id, &load))
    }

    /// Adds `amount` to the hub's committed load.
    ///
    /// Fails with `CapacityExceeded` if the result would pass the daily
    /// capacity; nothing is committed in that case.
    #[instrument(skip(self))]
    pub fn commit_capacity(&self, hub_id: HubId, amount: f64) -> DispatchResult<HubCapacity> {
        check_amount(amount)?;
        let mut load = self.load(hub_id)?.lock();
        if load.committed + amount > load.daily_capacity + EPS {
            warn!(committed = load.committed, capacity = load.daily_capacity, "commit rejected");
            return Err(DispatchError::hub_capacity(
                hub_id,
                format!(
                    "{} committed + {} requested exceeds daily capacity {}",
                    load.committed, amount, load.daily_capacity
                ),
            ));
        }
        load.committed += amount;
        info!(committed = load.committed, "hub capacity committed");
        Ok(snapshot(hub_id, &load))
    }

    /// Removes `amount` from the hub's committed load, stopping at zero.
    #[instrument(skip(self))]
    pub fn release_capacity(&self, hub_id: HubId, amount: f64) -> DispatchResult<HubCapacity> {
        check_amount(amount)?;
        let mut load = self.load(hub_id)?.lock();
        load.committed = (load.committed - amount).max(0.0);
        debug!(committed = load.committed, "hub capacity released");
        Ok(snapshot(hub_id, &load))
    }

    /// Looks for a transfer hub through which `demand` can travel without
    /// pushing any hub on the path past the utilization ceiling.
    ///
    /// `demand` is in the same unit as hub capacity and prices lanes as
    /// weight. Candidates must end at or below the ceiling after taking the
    /// demand and must have at least `demand` spare. The winner has the
    /// lowest cost increase over the direct path, ties going to the lowest
    /// hub id. Nothing is committed.
    #[instrument(skip(self))]
    pub fn find_alternative_hub(
        &self,
        origin: HubId,
        dest: HubId,
        service_level: ServiceLevel,
        demand: f64,
        optimize_for: OptimizeFor,
    ) -> DispatchResult<Option<AlternativeHub>> {
        check_amount(demand)?;
        self.load(origin)?;
        self.load(dest)?;

        let loads: Vec<(HubId, HubLoad)> = {
            let guards = self.lock_ascending(self.loads.keys().copied())?;
            guards.iter().map(|(id, g)| (*id, **g)).collect()
        };
        let ceiling = self.config.utilization_ceiling;
        let fits = |load: &HubLoad| {
            load.daily_capacity > 0.0
                && (load.committed + demand) / load.daily_capacity <= ceiling + EPS
                && load.spare() + EPS >= demand
        };
        let congested: HashSet<HubId> = loads
            .iter()
            .filter(|(_, l)| !fits(l))
            .map(|(id, _)| *id)
            .collect();

        let query = PathQuery::new(optimize_for).with_load(demand, 0.0);
        let baseline = self
            .graph
            .find_optimal_route(origin, dest, service_level, &query)
            .map(|p| p.primary(optimize_for))
            .unwrap_or(0.0);

        let mut best: Option<AlternativeHub> = None;
        for (hub_id, load) in &loads {
            if *hub_id == origin || *hub_id == dest || congested.contains(hub_id) {
                continue;
            }
            let first = self
                .graph
                .find_route_avoiding(origin, *hub_id, service_level, &query, &congested);
            let second = self
                .graph
                .find_route_avoiding(*hub_id, dest, service_level, &query, &congested);
            let (Ok(first), Ok(second)) = (first, second) else {
                continue;
            };
            let path = first.join(second);
            let incremental_cost = path.primary(optimize_for) - baseline;
            if best
                .as_ref()
                .is_none_or(|b| incremental_cost < b.incremental_cost - EPS)
            {
                best = Some(AlternativeHub {
                    hub_id: *hub_id,
                    path,
                    incremental_cost,
                    utilization_after: (load.committed + demand) / load.daily_capacity,
                });
            }
        }

        match &best {
            Some(alt) => debug!(hub_id = alt.hub_id, incremental = alt.incremental_cost, "alternative hub found"),
            None => debug!("no transfer hub qualifies"),
        }
        Ok(best)
    }

    /// Shifts committed load from the most to the least utilized hubs of the
    /// set until utilizations are within the spread threshold.
    ///
    /// Each move transfers the amount that equalizes the two hubs and is
    /// priced as the cheapest lane path between them. Moves are accepted
    /// while the cumulative cost stays within the tolerance. The spread never
    /// grows.
    #[instrument(skip(self))]
    pub fn rebalance_hub_loads(&self, hub_ids: &[HubId]) -> DispatchResult<RebalanceReport> {
        let mut guards = self.lock_ascending(hub_ids.iter().copied())?;
        let spread_before = spread(&guards);
        let mut moves = Vec::new();
        let mut total_cost = 0.0;
        let level = self.config.rebalance_service_level;

        while moves.len() < self.config.rebalance_max_moves
            && spread(&guards) > self.config.rebalance_spread_threshold + EPS
        {
            let Some(src) = (0..guards.len()).max_by(|&a, &b| {
                guards[a]
                    .1
                    .utilization()
                    .total_cmp(&guards[b].1.utilization())
                    .then(guards[b].0.cmp(&guards[a].0))
            }) else {
                break;
            };
            let mut targets: Vec<usize> = (0..guards.len()).filter(|&i| i != src).collect();
            targets.sort_by(|&a, &b| {
                guards[a]
                    .1
                    .utilization()
                    .total_cmp(&guards[b].1.utilization())
                    .then(guards[a].0.cmp(&guards[b].0))
            });

            let source = *guards[src].1;
            let mut chosen = None;
            for dst in targets {
                let target = *guards[dst].1;
                if target.utilization() + EPS >= source.utilization() {
                    break;
                }
                let amount = equalizing_amount(&source, &target);
                if amount <= EPS {
                    continue;
                }
                let query = PathQuery::new(OptimizeFor::Cost).with_load(amount, 0.0);
                let Ok(path) = self
                    .graph
                    .find_optimal_route(guards[src].0, guards[dst].0, level, &query)
                else {
                    continue;
                };
                if total_cost + path.total_cost > self.config.rebalance_cost_tolerance + EPS {
                    debug!(from = guards[src].0, to = guards[dst].0, cost = path.total_cost, "transfer over cost tolerance");
                    continue;
                }
                chosen = Some((dst, amount, path.total_cost));
                break;
            }

            let Some((dst, amount, cost)) = chosen else {
                warn!("no acceptable transfer left");
                break;
            };
            guards[src].1.committed -= amount;
            guards[dst].1.committed += amount;
            total_cost += cost;
            moves.push(HubTransfer {
                from: guards[src].0,
                to: guards[dst].0,
                amount,
                cost,
            });
        }

        let spread_after = spread(&guards);
        info!(moves = moves.len(), spread_before, spread_after, total_cost, "hub loads rebalanced");
        Ok(RebalanceReport {
            moves,
            spread_before,
            spread_after,
            total_cost,
        })
    }

    fn load(&self, hub_id: HubId) -> DispatchResult<&Mutex<HubLoad>> {
        self.loads
            .get(&hub_id)
            .ok_or(DispatchError::UnknownHub(hub_id))
    }

    fn lock_ascending<I>(&self, ids: I) -> DispatchResult<Vec<(HubId, MutexGuard<'_, HubLoad>)>>
    where
        I: IntoIterator<Item = HubId>,
    {
        let mut ids: Vec<HubId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let locks = ids
            .into_iter()
            .map(|id| self.load(id).map(|m| (id, m)))
            .collect::<DispatchResult<Vec<_>>>()?;
        Ok(locks.into_iter().map(|(id, m)| (id, m.lock())).collect())
    }
}

/// Amount moving from `source` to `target` that leaves both equally
/// utilized, bounded by what the target can take.
fn equalizing_amount(source: &HubLoad, target: &HubLoad) -> f64 {
    let (cs, cd) = (source.daily_capacity, target.daily_capacity);
    if cs <= 0.0 || cd <= 0.0 {
        return 0.0;
    }
    let x = (source.committed * cd - target.committed * cs) / (cs + cd);
    x.min(target.spare()).min(source.committed).max(0.0)
}

fn spread(guards: &[(HubId, MutexGuard<'_, HubLoad>)]) -> f64 {
    let mut utilizations = guards.iter().map(|(_, g)| g.utilization());
    let Some(first) = utilizations.next() else {
        return 0.0;
    };
    let (lo, hi) = utilizations.fold((first, first), |(lo, hi), u| (lo.min(u), hi.max(u)));
    hi - lo
}

fn snapshot(hub_id: HubId, load: &HubLoad) -> HubCapacity {
    HubCapacity {
        hub_id,
        daily_capacity: load.daily_capacity,
        committed_today: load.committed,
        utilization: load.utilization(),
    }
}

fn check_amount(amount: f64) -> DispatchResult<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(DispatchError::malformed(format!(
            "capacity amount must be finite and non-negative, got {amount}"
        )))
    }
}
