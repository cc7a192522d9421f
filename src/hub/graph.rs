//! Static hub network and path queries.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use crate::models::{HubId, HubNode, Lane, ServiceLevel};

const EPS: f64 = 1e-9;

/// Which lane attribute a path query minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeFor {
    #[default]
    Cost,
    Time,
    Distance,
}

/// Parameters of a path query. `weight` (kg) and `volume` (cbm) price lanes
/// under [`OptimizeFor::Cost`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PathQuery {
    pub optimize_for: OptimizeFor,
    pub weight: f64,
    pub volume: f64,
}

impl PathQuery {
    pub fn new(optimize_for: OptimizeFor) -> Self {
        Self {
            optimize_for,
            ..Self::default()
        }
    }

    pub fn with_load(mut self, weight: f64, volume: f64) -> Self {
        self.weight = weight;
        self.volume = volume;
        self
    }

    fn weight_of(&self, lane: &Lane) -> f64 {
        match self.optimize_for {
            OptimizeFor::Cost => lane.cost_for(self.weight, self.volume),
            OptimizeFor::Time => lane.transit_time,
            OptimizeFor::Distance => lane.distance,
        }
    }
}

/// A hub-to-hub path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Hubs in travel order, origin first and destination last.
    pub hops: Vec<HubId>,
    pub total_cost: f64,
    /// Minutes.
    pub total_time: f64,
    pub total_distance: f64,
}

impl PathResult {
    /// Number of lanes traversed.
    pub fn hop_count(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    /// The value the query minimized.
    pub fn primary(&self, optimize_for: OptimizeFor) -> f64 {
        match optimize_for {
            OptimizeFor::Cost => self.total_cost,
            OptimizeFor::Time => self.total_time,
            OptimizeFor::Distance => self.total_distance,
        }
    }

    /// This path followed by `next`, which must start where this one ends.
    pub(crate) fn join(mut self, next: PathResult) -> PathResult {
        self.hops.extend(next.hops.into_iter().skip(1));
        self.total_cost += next.total_cost;
        self.total_time += next.total_time;
        self.total_distance += next.total_distance;
        self
    }
}

/// Search label, compared lexicographically: primary objective, then hop
/// count, then transit time.
#[derive(Debug, Clone, Copy)]
struct Label {
    primary: f64,
    hops: usize,
    time: f64,
}

impl Label {
    fn compare(&self, other: &Label) -> Ordering {
        fuzzy_cmp(self.primary, other.primary)
            .then(self.hops.cmp(&other.hops))
            .then(fuzzy_cmp(self.time, other.time))
    }
}

fn fuzzy_cmp(a: f64, b: f64) -> Ordering {
    if (a - b).abs() <= EPS {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

struct State {
    label: Label,
    hub: HubId,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .label
            .compare(&self.label)
            .then_with(|| other.hub.cmp(&self.hub))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Directed graph of hubs and active lanes.
///
/// # Examples
///
/// ```
/// use u_dispatch::hub::{HubRouteGraph, OptimizeFor, PathQuery};
/// use u_dispatch::models::{GeoPoint, HubNode, Lane, ServiceLevel};
///
/// let hub = |id| HubNode::new(id, GeoPoint::new(0.0, 0.0), 100.0);
/// let lane = |a, b, cost| Lane::new(a, b, ServiceLevel::Standard).with_costs(cost, 0.0, 0.0);
/// let graph = HubRouteGraph::new(
///     vec![hub(1), hub(2), hub(3)],
///     vec![lane(1, 2, 10.0), lane(2, 3, 10.0), lane(1, 3, 30.0)],
/// ).unwrap();
///
/// let path = graph
///     .find_optimal_route(1, 3, ServiceLevel::Standard, &PathQuery::new(OptimizeFor::Cost))
///     .unwrap();
/// assert_eq!(path.hops, vec![1, 2, 3]);
/// assert_eq!(path.total_cost, 20.0);
/// ```
#[derive(Debug, Clone)]
pub struct HubRouteGraph {
    hubs: BTreeMap<HubId, HubNode>,
    outgoing: HashMap<HubId, Vec<Lane>>,
}

impl HubRouteGraph {
    /// Builds the graph; inactive lanes are dropped.
    ///
    /// Fails with `MalformedInput` on duplicate hubs, lanes to unknown hubs,
    /// or negative lane attributes.
    pub fn new(hubs: Vec<HubNode>, lanes: Vec<Lane>) -> DispatchResult<Self> {
        let mut by_id = BTreeMap::new();
        for hub in hubs {
            if !(hub.daily_capacity.is_finite() && hub.daily_capacity >= 0.0)
                || !(hub.committed_today.is_finite() && hub.committed_today >= 0.0)
            {
                return Err(DispatchError::malformed(format!(
                    "hub {} has invalid capacity figures",
                    hub.id
                )));
            }
            let id = hub.id;
            if by_id.insert(id, hub).is_some() {
                return Err(DispatchError::malformed(format!("hub {id} listed twice")));
            }
        }

        let mut outgoing: HashMap<HubId, Vec<Lane>> = HashMap::new();
        for lane in lanes.into_iter().filter(|l| l.active) {
            for end in [lane.origin_hub_id, lane.dest_hub_id] {
                if !by_id.contains_key(&end) {
                    return Err(DispatchError::malformed(format!(
                        "lane {} -> {} references unknown hub {end}",
                        lane.origin_hub_id, lane.dest_hub_id
                    )));
                }
            }
            let attrs = [
                lane.distance,
                lane.transit_time,
                lane.base_cost,
                lane.cost_per_kg,
                lane.cost_per_cbm,
            ];
            if attrs.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(DispatchError::malformed(format!(
                    "lane {} -> {} has negative or non-finite attributes",
                    lane.origin_hub_id, lane.dest_hub_id
                )));
            }
            outgoing.entry(lane.origin_hub_id).or_default().push(lane);
        }

        Ok(Self {
            hubs: by_id,
            outgoing,
        })
    }

    pub fn hub(&self, id: HubId) -> Option<&HubNode> {
        self.hubs.get(&id)
    }

    /// Hubs in ascending id order.
    pub fn hubs(&self) -> impl Iterator<Item = &HubNode> {
        self.hubs.values()
    }

    /// Cheapest (or fastest, or shortest) path over active lanes of the
    /// given service level.
    ///
    /// Ties go to fewer hops, then lower transit time, then the lowest
    /// predecessor hub id. `origin == dest` is a zero-hop path; unknown hubs
    /// have no path.
    pub fn find_optimal_route(
        &self,
        origin: HubId,
        dest: HubId,
        service_level: ServiceLevel,
        query: &PathQuery,
    ) -> DispatchResult<PathResult> {
        self.find_route_avoiding(origin, dest, service_level, query, &HashSet::new())
    }

    /// As [`find_optimal_route`](Self::find_optimal_route) but never passes
    /// through a hub in `avoid` (origin and destination are always allowed).
    pub fn find_route_avoiding(
        &self,
        origin: HubId,
        dest: HubId,
        service_level: ServiceLevel,
        query: &PathQuery,
        avoid: &HashSet<HubId>,
    ) -> DispatchResult<PathResult> {
        let no_path = || DispatchError::NoPathFound { origin, dest };
        if !self.hubs.contains_key(&origin) || !self.hubs.contains_key(&dest) {
            return Err(no_path());
        }
        if origin == dest {
            return Ok(PathResult {
                hops: vec![origin],
                total_cost: 0.0,
                total_time: 0.0,
                total_distance: 0.0,
            });
        }

        let mut best: HashMap<HubId, Label> = HashMap::new();
        let mut via: HashMap<HubId, (HubId, &Lane)> = HashMap::new();
        let mut settled: HashSet<HubId> = HashSet::new();
        let mut heap = BinaryHeap::new();

        let start = Label {
            primary: 0.0,
            hops: 0,
            time: 0.0,
        };
        best.insert(origin, start);
        heap.push(State {
            label: start,
            hub: origin,
        });

        while let Some(State { label, hub }) = heap.pop() {
            if !settled.insert(hub) {
                continue;
            }
            if hub == dest {
                break;
            }
            if hub != origin && avoid.contains(&hub) {
                continue;
            }
            let Some(lanes) = self.outgoing.get(&hub) else {
                continue;
            };
            for lane in lanes.iter().filter(|l| l.service_level == service_level) {
                let next = lane.dest_hub_id;
                if settled.contains(&next) {
                    continue;
                }
                let candidate = Label {
                    primary: label.primary + query.weight_of(lane),
                    hops: label.hops + 1,
                    time: label.time + lane.transit_time,
                };
                let order = best
                    .get(&next)
                    .map_or(Ordering::Less, |cur| candidate.compare(cur));
                let replace = match order {
                    Ordering::Less => true,
                    Ordering::Equal => via.get(&next).is_some_and(|(p, _)| hub < *p),
                    Ordering::Greater => false,
                };
                if replace {
                    best.insert(next, candidate);
                    via.insert(next, (hub, lane));
                    heap.push(State {
                        label: candidate,
                        hub: next,
                    });
                }
            }
        }

        if !via.contains_key(&dest) {
            return Err(no_path());
        }

        let mut hops = vec![dest];
        let mut result = PathResult {
            hops: Vec::new(),
            total_cost: 0.0,
            total_time: 0.0,
            total_distance: 0.0,
        };
        let mut cursor = dest;
        while let Some(&(prev, lane)) = via.get(&cursor) {
            result.total_cost += lane.cost_for(query.weight, query.volume);
            result.total_time += lane.transit_time;
            result.total_distance += lane.distance;
            hops.push(prev);
            cursor = prev;
            if cursor == origin {
                break;
            }
        }
        hops.reverse();
        result.hops = hops;
        Ok(result)
    }
}
