//! Shipment-to-driver assignment.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::cluster::leader_clusters;
use super::ledger::AssignmentLedger;
use crate::config::AssignmentConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::models::{
    stop_id_for, Assignment, AssignmentStatus, BranchId, Driver, DriverId, Route, Shipment,
    ShipmentId, Stop, StopKind, VehicleConstraints,
};
use crate::optimizer::{OptimizeOptions, RouteOptimizer};
use crate::ports::{DriverStore, ShipmentStore};
use crate::reroute::RouteRegistry;

const EPS: f64 = 1e-9;

/// Outcome of placing one shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub shipment_id: ShipmentId,
    /// `None` when the shipment could not be placed.
    pub driver_id: Option<DriverId>,
    pub reason: String,
    pub marginal_cost: Option<f64>,
}

impl AssignmentResult {
    fn failed(shipment_id: ShipmentId, err: &DispatchError) -> Self {
        Self {
            shipment_id,
            driver_id: None,
            reason: err.to_string(),
            marginal_cost: None,
        }
    }
}

/// Scan reported by the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanEvent {
    PickedUp,
    Delivered,
}

/// One driver's planned load for a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverWorkload {
    pub driver_id: DriverId,
    pub stop_count: usize,
    pub total_distance: f64,
    /// Planned route minutes ÷ remaining working minutes.
    pub utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMove {
    pub shipment_id: ShipmentId,
    pub from: DriverId,
    pub to: DriverId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRebalance {
    pub moves: Vec<WorkloadMove>,
    /// Max minus min utilization before any move.
    pub gap_before: f64,
    pub gap_after: f64,
}

/// A driver that can take work, with the constraints their route plans under.
#[derive(Debug, Clone)]
struct Candidate {
    driver: Driver,
    constraints: VehicleConstraints,
}

impl Candidate {
    fn id(&self) -> DriverId {
        self.driver.id
    }
}

/// The engine's copy of a driver's stop list.
#[derive(Debug)]
struct DriverPlan {
    driver_id: DriverId,
    stops: Vec<Stop>,
    /// Bumped on every change, whoever made it.
    version: u64,
    route: Option<Route>,
    constraints: VehicleConstraints,
    service_date: NaiveDate,
    /// Registry version this plan last wrote or adopted.
    published: Option<u64>,
}

impl DriverPlan {
    fn utilization(&self) -> f64 {
        match &self.route {
            Some(route) if !self.stops.is_empty() => {
                route_utilization(route, self.constraints.available_minutes)
            }
            _ => 0.0,
        }
    }
}

fn route_utilization(route: &Route, available_minutes: f64) -> f64 {
    if route.is_empty() {
        0.0
    } else if available_minutes > 0.0 {
        route.total_time() / available_minutes
    } else {
        1.0
    }
}

/// Plan snapshot taken outside the lock.
struct Snapshot {
    candidate: Candidate,
    stops: Vec<Stop>,
    version: u64,
    utilization: f64,
}

enum Commit {
    Done(Route),
    Stale(u64),
}

/// Assigns a branch's shipments to its drivers.
///
/// Each driver's plan sits behind its own lock and carries a version. A
/// selection is computed on a snapshot and committed only if the plan is
/// still at the snapshot's version; otherwise the selection is recomputed.
///
/// The shared [`RouteRegistry`] holds the committed route. A plan whose
/// vehicle moved on in the registry (a reroute, say) adopts the registry's
/// route before it is read or changed, and every commit swaps against the
/// registry version the plan last saw.
///
/// Lock order is driver plans in ascending driver id, then the registry,
/// then the ledger.
pub struct AssignmentEngine {
    shipments: Arc<dyn ShipmentStore>,
    drivers: Arc<dyn DriverStore>,
    optimizer: Arc<RouteOptimizer>,
    routes: Arc<RouteRegistry>,
    config: AssignmentConfig,
    ledger: AssignmentLedger,
    plans: RwLock<HashMap<DriverId, Arc<Mutex<DriverPlan>>>>,
    service_date: RwLock<NaiveDate>,
}

impl std::fmt::Debug for AssignmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentEngine")
            .field("config", &self.config)
            .field("plans", &self.plans.read().len())
            .field("service_date", &*self.service_date.read())
            .finish_non_exhaustive()
    }
}

impl AssignmentEngine {
    pub fn new(
        shipments: Arc<dyn ShipmentStore>,
        drivers: Arc<dyn DriverStore>,
        optimizer: Arc<RouteOptimizer>,
        routes: Arc<RouteRegistry>,
        config: AssignmentConfig,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            shipments,
            drivers,
            optimizer,
            routes,
            config,
            ledger: AssignmentLedger::default(),
            plans: RwLock::new(HashMap::new()),
            service_date: RwLock::new(Utc::now().date_naive()),
        })
    }

    /// Day that newly committed plans are stamped with.
    pub fn service_date(&self) -> NaiveDate {
        *self.service_date.read()
    }

    pub fn set_service_date(&self, date: NaiveDate) {
        *self.service_date.write() = date;
    }

    pub fn assignment(&self, shipment_id: ShipmentId) -> Option<Assignment> {
        self.ledger.get(shipment_id)
    }

    /// The driver's current planned route, if the engine has planned one.
    pub fn driver_route(&self, driver_id: DriverId) -> Option<Route> {
        let plan = self.plans.read().get(&driver_id).cloned()?;
        let mut plan = plan.lock();
        self.sync(&mut plan);
        plan.route.clone()
    }

    /// Places the shipment with the driver whose route it extends most
    /// cheaply.
    ///
    /// Only active drivers with a vehicle compete, and only insertions that
    /// keep every prefix within capacity and the route within the driver's
    /// remaining minutes count. Equal costs go to the lower driver id.
    #[instrument(skip(self))]
    pub fn auto_assign(
        &self,
        branch_id: BranchId,
        shipment_id: ShipmentId,
    ) -> DispatchResult<AssignmentResult> {
        let shipment = self.load_shipment(branch_id, shipment_id)?;
        self.ledger.ensure_claimable(shipment_id)?;
        let pair = shipment_pair(&shipment)?;
        let candidates = self.candidates(branch_id)?;

        let mut last_conflict = None;
        for attempt in 1..=self.config.commit_attempts {
            let mut best: Option<(Snapshot, Vec<Stop>, f64)> = None;
            for candidate in &candidates {
                let snapshot = self.snapshot(candidate);
                let quote = match self.optimizer.insertion_cost(
                    &snapshot.stops,
                    &pair,
                    &candidate.constraints,
                    &[],
                ) {
                    Ok(Some(q)) => q,
                    Ok(None) => continue,
                    Err(err) => {
                        debug!(driver_id = candidate.id(), %err, "driver skipped");
                        continue;
                    }
                };
                if best
                    .as_ref()
                    .is_none_or(|(_, _, cost)| quote.marginal_cost < cost - EPS)
                {
                    best = Some((snapshot, quote.stops, quote.marginal_cost));
                }
            }

            let Some((snapshot, stops, cost)) = best else {
                warn!(candidates = candidates.len(), "no driver can absorb shipment");
                return Err(DispatchError::NoEligibleDriver { shipment_id });
            };
            let driver_id = snapshot.candidate.id();
            match self.commit(&snapshot.candidate, snapshot.version, stops, || {
                self.ledger.claim(shipment_id, driver_id).map(|_| ())
            })? {
                Commit::Done(_) => {
                    info!(driver_id, marginal_cost = cost, attempt, "shipment assigned");
                    return Ok(AssignmentResult {
                        shipment_id,
                        driver_id: Some(driver_id),
                        reason: format!(
                            "cheapest insertion among {} eligible drivers",
                            candidates.len()
                        ),
                        marginal_cost: Some(cost),
                    });
                }
                Commit::Stale(actual) => {
                    debug!(driver_id, attempt, "plan changed during selection, retrying");
                    last_conflict = Some((snapshot, actual));
                }
            }
        }

        Err(conflict_error(last_conflict))
    }

    /// Assigns a batch, cluster by cluster of nearby destinations.
    ///
    /// Results come back in input order. A shipment that fails gets a result
    /// with no driver and the error as reason; the rest still proceed.
    #[instrument(skip(self, shipment_ids), fields(count = shipment_ids.len()))]
    pub fn bulk_auto_assign(
        &self,
        branch_id: BranchId,
        shipment_ids: &[ShipmentId],
    ) -> DispatchResult<Vec<AssignmentResult>> {
        let mut results: HashMap<ShipmentId, AssignmentResult> = HashMap::new();
        let mut loaded = Vec::new();
        for &id in shipment_ids {
            if results.contains_key(&id) || loaded.iter().any(|s: &Shipment| s.id == id) {
                continue;
            }
            match self.load_shipment(branch_id, id) {
                Ok(s) => loaded.push(s),
                Err(err) if matches!(err, DispatchError::Store(_)) => return Err(err),
                Err(err) => {
                    results.insert(id, AssignmentResult::failed(id, &err));
                }
            }
        }

        let clusters = leader_clusters(&loaded, self.config.cluster_radius_km);
        debug!(clusters = clusters.len(), "shipments clustered");
        for cluster in clusters {
            for id in cluster {
                let result = self
                    .auto_assign(branch_id, id)
                    .unwrap_or_else(|err| AssignmentResult::failed(id, &err));
                results.insert(id, result);
            }
        }

        let placed = results.values().filter(|r| r.driver_id.is_some()).count();
        info!(placed, failed = results.len() - placed, "bulk assignment done");
        Ok(shipment_ids
            .iter()
            .filter_map(|id| results.get(id).cloned())
            .collect())
    }

    /// Gives the shipment to a chosen driver without comparing costs.
    ///
    /// The insertion must still fit the vehicle and the driver's remaining
    /// minutes; otherwise `CapacityExceeded`.
    #[instrument(skip(self))]
    pub fn manual_assign(
        &self,
        branch_id: BranchId,
        shipment_id: ShipmentId,
        driver_id: DriverId,
    ) -> DispatchResult<AssignmentResult> {
        let shipment = self.load_shipment(branch_id, shipment_id)?;
        self.ledger.ensure_claimable(shipment_id)?;
        let pair = shipment_pair(&shipment)?;

        let driver = self
            .drivers
            .driver(driver_id)?
            .ok_or(DispatchError::UnknownDriver(driver_id))?;
        if driver.branch_id != branch_id {
            return Err(DispatchError::BranchMismatch {
                entity: format!("driver {driver_id}"),
                expected: branch_id,
                actual: driver.branch_id,
            });
        }
        let Some(candidate) = self.candidate(driver)? else {
            return Err(DispatchError::driver_capacity(
                driver_id,
                "driver is inactive or has no vehicle",
            ));
        };

        let mut last_conflict = None;
        for _ in 0..self.config.commit_attempts {
            let snapshot = self.snapshot(&candidate);
            let quote = match self.optimizer.insertion_cost(
                &snapshot.stops,
                &pair,
                &candidate.constraints,
                &[],
            ) {
                Ok(Some(q)) => q,
                Ok(None) => {
                    return Err(DispatchError::driver_capacity(
                        driver_id,
                        "no placement fits vehicle capacity and remaining working minutes",
                    ))
                }
                Err(DispatchError::InfeasibleInput { reason, .. }) => {
                    return Err(DispatchError::driver_capacity(driver_id, reason))
                }
                Err(err) => return Err(err),
            };
            match self.commit(&candidate, snapshot.version, quote.stops, || {
                self.ledger.claim(shipment_id, driver_id).map(|_| ())
            })? {
                Commit::Done(_) => {
                    info!(marginal_cost = quote.marginal_cost, "shipment manually assigned");
                    return Ok(AssignmentResult {
                        shipment_id,
                        driver_id: Some(driver_id),
                        reason: "manual assignment".to_string(),
                        marginal_cost: Some(quote.marginal_cost),
                    });
                }
                Commit::Stale(actual) => last_conflict = Some((snapshot, actual)),
            }
        }
        Err(conflict_error(last_conflict))
    }

    /// Cancels an unassigned or assigned shipment and drops its stops.
    #[instrument(skip(self))]
    pub fn cancel(&self, shipment_id: ShipmentId) -> DispatchResult<Assignment> {
        let Some(record) = self.ledger.get(shipment_id) else {
            if self.shipments.shipment(shipment_id)?.is_none() {
                return Err(DispatchError::UnknownShipment(shipment_id));
            }
            return self.ledger.transition(shipment_id, AssignmentStatus::Cancelled);
        };
        let Some(driver_id) = record.driver_id.filter(|_| record.status.is_active()) else {
            return self.ledger.transition(shipment_id, AssignmentStatus::Cancelled);
        };
        let removed = [
            stop_id_for(shipment_id, StopKind::Pickup),
            stop_id_for(shipment_id, StopKind::Delivery),
        ];
        let assignment = self.update_plan(driver_id, &removed, || {
            self.ledger.transition(shipment_id, AssignmentStatus::Cancelled)
        })?;
        info!(driver_id, "assignment cancelled");
        Ok(assignment)
    }

    /// Records a field scan.
    ///
    /// A pickup scan puts the shipment in route and drops its pickup stop,
    /// so the delivery is carried from the route start. A delivery scan
    /// completes the assignment and drops the delivery stop.
    #[instrument(skip(self))]
    pub fn apply_scan_event(
        &self,
        shipment_id: ShipmentId,
        event: ScanEvent,
    ) -> DispatchResult<Assignment> {
        let (next, kind) = match event {
            ScanEvent::PickedUp => (AssignmentStatus::InRoute, StopKind::Pickup),
            ScanEvent::Delivered => (AssignmentStatus::Completed, StopKind::Delivery),
        };
        let Some(record) = self.ledger.get(shipment_id) else {
            if self.shipments.shipment(shipment_id)?.is_none() {
                return Err(DispatchError::UnknownShipment(shipment_id));
            }
            return self.ledger.transition(shipment_id, next);
        };
        let Some(driver_id) = record.driver_id.filter(|_| record.status.can_transition_to(next))
        else {
            return self.ledger.transition(shipment_id, next);
        };
        let assignment = self.update_plan(driver_id, &[stop_id_for(shipment_id, kind)], || {
            self.ledger.transition(shipment_id, next)
        })?;
        info!(driver_id, status = %assignment.status, "scan applied");
        Ok(assignment)
    }

    /// Per-driver load of the branch on `date`. Drivers without a plan for
    /// that date report zero load.
    pub fn get_workload_distribution(
        &self,
        branch_id: BranchId,
        date: NaiveDate,
    ) -> DispatchResult<Vec<DriverWorkload>> {
        let drivers = self.drivers.drivers_in_branch(branch_id)?;
        let plans = self.plans.read();
        Ok(drivers
            .iter()
            .filter(|d| d.active)
            .map(|d| {
                let planned = plans.get(&d.id).map(|p| {
                    let mut p = p.lock();
                    self.sync(&mut p);
                    if p.service_date != date || p.stops.is_empty() {
                        return (0, 0.0, 0.0);
                    }
                    let distance = p.route.as_ref().map_or(0.0, Route::total_distance);
                    (p.stops.len(), distance, p.utilization())
                });
                let (stop_count, total_distance, utilization) = planned.unwrap_or((0, 0.0, 0.0));
                DriverWorkload {
                    driver_id: d.id,
                    stop_count,
                    total_distance,
                    utilization,
                }
            })
            .collect())
    }

    /// Moves shipments from the busiest driver to less busy ones while each
    /// move strictly narrows the max−min utilization gap.
    ///
    /// Only shipments in `assigned` state with both stops still planned are
    /// movable. Stops when the gap is within the configured threshold, no
    /// move helps, or the move cap is reached.
    #[instrument(skip(self))]
    pub fn rebalance_workload(&self, branch_id: BranchId) -> DispatchResult<WorkloadRebalance> {
        let candidates = self.candidates(branch_id)?;
        let mut moves = Vec::new();
        let mut gap_before = None;
        let mut gap = 0.0;

        for _ in 0..self.config.rebalance_max_moves.max(1) {
            let snapshots: Vec<Snapshot> = candidates.iter().map(|c| self.snapshot(c)).collect();
            gap = utilization_gap(snapshots.iter().map(|s| s.utilization));
            gap_before.get_or_insert(gap);
            if moves.len() >= self.config.rebalance_max_moves
                || gap <= self.config.workload_gap_threshold + EPS
            {
                break;
            }
            let Some(best) = self.best_move(&snapshots, gap) else {
                debug!(gap, "no improving move");
                break;
            };
            let (src, dst) = (&snapshots[best.src], &snapshots[best.dst]);
            let mv = WorkloadMove {
                shipment_id: best.shipment_id,
                from: src.candidate.id(),
                to: dst.candidate.id(),
            };
            if self.apply_move(src, dst, &best)? {
                debug!(?mv, new_gap = best.gap, "workload moved");
                moves.push(mv);
            } else {
                debug!(?mv, "plans changed underneath, re-reading");
            }
        }

        let gap_after = if moves.is_empty() {
            gap
        } else {
            let snapshots: Vec<Snapshot> = candidates.iter().map(|c| self.snapshot(c)).collect();
            utilization_gap(snapshots.iter().map(|s| s.utilization))
        };
        let gap_before = gap_before.unwrap_or(gap_after);
        info!(moves = moves.len(), gap_before, gap_after, "workload rebalanced");
        Ok(WorkloadRebalance {
            moves,
            gap_before,
            gap_after,
        })
    }

    fn best_move(&self, snapshots: &[Snapshot], gap: f64) -> Option<MovePlan> {
        let src = (0..snapshots.len()).fold(None, |acc: Option<usize>, i| match acc {
            Some(j) if snapshots[j].utilization + EPS >= snapshots[i].utilization => Some(j),
            _ => Some(i),
        })?;
        let source = &snapshots[src];

        let mut shipment_ids: Vec<ShipmentId> = source
            .stops
            .iter()
            .filter(|s| s.is_pickup())
            .map(Stop::shipment_id)
            .filter(|&id| {
                let delivery = stop_id_for(id, StopKind::Delivery);
                source.stops.iter().any(|s| s.id() == delivery)
                    && self.ledger.get(id).is_some_and(|a| {
                        a.status == AssignmentStatus::Assigned
                            && a.driver_id == Some(source.candidate.id())
                    })
            })
            .collect();
        shipment_ids.sort_unstable();

        let mut best: Option<MovePlan> = None;
        for shipment_id in shipment_ids {
            let (pair, remaining): (Vec<Stop>, Vec<Stop>) = source
                .stops
                .iter()
                .cloned()
                .partition(|s| s.shipment_id() == shipment_id);
            let Ok(src_route) =
                self.optimizer
                    .evaluate(&remaining, &source.candidate.constraints, &[])
            else {
                continue;
            };
            let src_util =
                route_utilization(&src_route, source.candidate.constraints.available_minutes);

            for (dst, target) in snapshots.iter().enumerate() {
                if dst == src || target.utilization + EPS >= source.utilization {
                    continue;
                }
                let Ok(Some(quote)) = self.optimizer.insertion_cost(
                    &target.stops,
                    &pair,
                    &target.candidate.constraints,
                    &[],
                ) else {
                    continue;
                };
                let Ok(dst_route) =
                    self.optimizer
                        .evaluate(&quote.stops, &target.candidate.constraints, &[])
                else {
                    continue;
                };
                let dst_util =
                    route_utilization(&dst_route, target.candidate.constraints.available_minutes);
                let new_gap = utilization_gap(snapshots.iter().enumerate().map(|(i, s)| {
                    if i == src {
                        src_util
                    } else if i == dst {
                        dst_util
                    } else {
                        s.utilization
                    }
                }));
                if new_gap < gap - EPS && best.as_ref().is_none_or(|b| new_gap < b.gap - EPS) {
                    best = Some(MovePlan {
                        shipment_id,
                        src,
                        dst,
                        src_stops: remaining.clone(),
                        dst_stops: quote.stops,
                        gap: new_gap,
                    });
                }
            }
        }
        best
    }

    /// Commits a move if both plans are still at their snapshot versions.
    fn apply_move(&self, src: &Snapshot, dst: &Snapshot, mv: &MovePlan) -> DispatchResult<bool> {
        let src_plan = self.plan(&src.candidate);
        let dst_plan = self.plan(&dst.candidate);
        let (mut src_guard, mut dst_guard) = if src.candidate.id() < dst.candidate.id() {
            let s = src_plan.lock();
            (s, dst_plan.lock())
        } else {
            let d = dst_plan.lock();
            (src_plan.lock(), d)
        };
        let adopted = self.sync(&mut src_guard) | self.sync(&mut dst_guard);
        if adopted || src_guard.version != src.version || dst_guard.version != dst.version {
            return Ok(false);
        }
        let src_route = self
            .optimizer
            .evaluate(&mv.src_stops, &src.candidate.constraints, &[])?
            .with_version(next_version(src_guard.published));
        let dst_route = self
            .optimizer
            .evaluate(&mv.dst_stops, &dst.candidate.constraints, &[])?
            .with_version(next_version(dst_guard.published));
        let swaps = vec![
            (src_guard.published, src_route.clone()),
            (dst_guard.published, dst_route.clone()),
        ];
        match self.routes.compare_and_swap_all(swaps, || {
            self.ledger
                .reassign(mv.shipment_id, src.candidate.id(), dst.candidate.id())
                .map(|_| ())
        }) {
            Ok(()) => {}
            Err(DispatchError::ConcurrentModification { .. }) => return Ok(false),
            Err(err) => return Err(err),
        }
        let today = self.service_date();
        self.install(&mut src_guard, &src.candidate, mv.src_stops.clone(), src_route, today);
        self.install(&mut dst_guard, &dst.candidate, mv.dst_stops.clone(), dst_route, today);
        Ok(true)
    }

    /// Swaps the plan into the registry and, if `claim` succeeds, installs it.
    fn commit(
        &self,
        candidate: &Candidate,
        expected_version: u64,
        stops: Vec<Stop>,
        claim: impl FnOnce() -> DispatchResult<()>,
    ) -> DispatchResult<Commit> {
        let plan = self.plan(candidate);
        let mut plan = plan.lock();
        if self.sync(&mut plan) || plan.version != expected_version {
            return Ok(Commit::Stale(plan.version));
        }
        let route = self
            .optimizer
            .evaluate(&stops, &candidate.constraints, &[])?
            .with_version(next_version(plan.published));
        match self
            .routes
            .compare_and_swap_all(vec![(plan.published, route.clone())], claim)
        {
            Ok(()) => {}
            Err(DispatchError::ConcurrentModification { .. }) => {
                return Ok(Commit::Stale(plan.version))
            }
            Err(err) => return Err(err),
        }
        let today = self.service_date();
        Ok(Commit::Done(self.install(&mut plan, candidate, stops, route, today)))
    }

    /// Removes stops from a driver's plan and re-times it. If the remaining
    /// order no longer fits the vehicle it is re-sequenced.
    fn update_plan(
        &self,
        driver_id: DriverId,
        removed: &[u64],
        record: impl FnOnce() -> DispatchResult<Assignment>,
    ) -> DispatchResult<Assignment> {
        let Some(plan) = self.plans.read().get(&driver_id).cloned() else {
            return record();
        };
        let mut plan = plan.lock();
        self.sync(&mut plan);
        let stops: Vec<Stop> = plan
            .stops
            .iter()
            .filter(|s| !removed.contains(&s.id()))
            .cloned()
            .collect();
        let constraints = plan.constraints.clone();
        let route = match self.optimizer.evaluate(&stops, &constraints, &[]) {
            Ok(route) => route,
            Err(DispatchError::InfeasibleInput { .. }) => {
                warn!(driver_id, "remaining order over capacity, re-sequencing");
                self.optimizer
                    .optimize(&stops, &constraints, &OptimizeOptions::default())?
                    .route
            }
            Err(err) => return Err(err),
        };
        let route = route.with_version(next_version(plan.published));
        let assignment = self
            .routes
            .compare_and_swap_all(vec![(plan.published, route.clone())], record)?;
        plan.stops = route.stops();
        plan.version += 1;
        plan.published = Some(route.version());
        plan.route = Some(route);
        plan.service_date = self.service_date();
        Ok(assignment)
    }

    fn install(
        &self,
        plan: &mut DriverPlan,
        candidate: &Candidate,
        stops: Vec<Stop>,
        route: Route,
        today: NaiveDate,
    ) -> Route {
        plan.stops = stops;
        plan.version += 1;
        plan.constraints = candidate.constraints.clone();
        plan.service_date = today;
        plan.published = Some(route.version());
        plan.route = Some(route.clone());
        route
    }

    /// Adopts the registry's route when another writer moved the vehicle
    /// past the version this plan last saw.
    ///
    /// Shipments the adopted route adds are claimed for the driver and
    /// shipments it drops are released. Returns whether the plan changed.
    fn sync(&self, plan: &mut DriverPlan) -> bool {
        let vehicle_id = plan.constraints.vehicle.id();
        let current = self.routes.current(vehicle_id);
        let version = current.as_ref().map(Route::version);
        if version == plan.published {
            return false;
        }
        let before: BTreeSet<ShipmentId> = plan.stops.iter().map(Stop::shipment_id).collect();
        let (stops, route) = match current {
            Some(route) => (route.stops(), Some(route)),
            None => (Vec::new(), None),
        };
        let after: BTreeSet<ShipmentId> = stops.iter().map(Stop::shipment_id).collect();
        for &shipment_id in after.difference(&before) {
            if let Err(err) = self.ledger.claim(shipment_id, plan.driver_id) {
                warn!(shipment_id, driver_id = plan.driver_id, %err, "adopted shipment is held elsewhere");
            }
        }
        for &shipment_id in before.difference(&after) {
            if !self.ledger.release(shipment_id, plan.driver_id) {
                debug!(shipment_id, "dropped shipment keeps its status");
            }
        }
        info!(
            driver_id = plan.driver_id,
            vehicle_id,
            ?version,
            "plan adopted registry route"
        );
        plan.stops = stops;
        plan.route = route;
        plan.published = version;
        plan.version += 1;
        true
    }

    fn load_shipment(&self, branch_id: BranchId, shipment_id: ShipmentId) -> DispatchResult<Shipment> {
        let shipment = self
            .shipments
            .shipment(shipment_id)?
            .ok_or(DispatchError::UnknownShipment(shipment_id))?;
        if shipment.branch_id != branch_id {
            return Err(DispatchError::BranchMismatch {
                entity: format!("shipment {shipment_id}"),
                expected: branch_id,
                actual: shipment.branch_id,
            });
        }
        Ok(shipment)
    }

    /// Active drivers of the branch with a known vehicle, ascending id.
    fn candidates(&self, branch_id: BranchId) -> DispatchResult<Vec<Candidate>> {
        let mut out = Vec::new();
        for driver in self.drivers.drivers_in_branch(branch_id)? {
            if let Some(c) = self.candidate(driver)? {
                out.push(c);
            }
        }
        out.sort_by_key(Candidate::id);
        Ok(out)
    }

    fn candidate(&self, driver: Driver) -> DispatchResult<Option<Candidate>> {
        if !driver.active {
            return Ok(None);
        }
        let Some(vehicle_id) = driver.vehicle_id else {
            return Ok(None);
        };
        let Some(vehicle) = self.drivers.vehicle(vehicle_id)? else {
            debug!(driver_id = driver.id, vehicle_id, "vehicle not found");
            return Ok(None);
        };
        let constraints = VehicleConstraints::for_vehicle(vehicle)
            .with_driver(driver.id)
            .starting_at(driver.current_location, 0.0)
            .with_available_minutes(driver.remaining_minutes);
        Ok(Some(Candidate {
            driver,
            constraints,
        }))
    }

    fn plan(&self, candidate: &Candidate) -> Arc<Mutex<DriverPlan>> {
        if let Some(plan) = self.plans.read().get(&candidate.id()) {
            return Arc::clone(plan);
        }
        let mut plans = self.plans.write();
        let plan = plans.entry(candidate.id()).or_insert_with(|| {
            let stops = candidate.driver.assigned_stops.clone();
            let route = self
                .optimizer
                .evaluate(&stops, &candidate.constraints, &[])
                .ok();
            Arc::new(Mutex::new(DriverPlan {
                driver_id: candidate.id(),
                stops,
                version: 0,
                route,
                constraints: candidate.constraints.clone(),
                service_date: self.service_date(),
                published: None,
            }))
        });
        Arc::clone(plan)
    }

    fn snapshot(&self, candidate: &Candidate) -> Snapshot {
        let plan = self.plan(candidate);
        let mut plan = plan.lock();
        self.sync(&mut plan);
        Snapshot {
            candidate: candidate.clone(),
            stops: plan.stops.clone(),
            version: plan.version,
            utilization: plan.utilization(),
        }
    }
}

struct MovePlan {
    shipment_id: ShipmentId,
    src: usize,
    dst: usize,
    src_stops: Vec<Stop>,
    dst_stops: Vec<Stop>,
    gap: f64,
}

fn shipment_pair(shipment: &Shipment) -> DispatchResult<[Stop; 2]> {
    let (pickup, delivery) = shipment.stops();
    pickup.validate()?;
    delivery.validate()?;
    Ok([pickup, delivery])
}

/// Version a plan publishes next: one above the last one it saw.
fn next_version(published: Option<u64>) -> u64 {
    published.map_or(1, |v| v + 1)
}

fn utilization_gap(values: impl Iterator<Item = f64>) -> f64 {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), u| {
        (lo.min(u), hi.max(u))
    });
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}

fn conflict_error(last: Option<(Snapshot, u64)>) -> DispatchError {
    match last {
        Some((snapshot, actual)) => DispatchError::ConcurrentModification {
            vehicle_id: snapshot.candidate.constraints.vehicle.id(),
            expected: snapshot.version,
            actual,
        },
        None => DispatchError::config("assignment.commit_attempts must be at least 1"),
    }
}
