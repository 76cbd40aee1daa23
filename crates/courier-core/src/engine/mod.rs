//! Order lifecycle engine.
//!
//! The [`LifecycleEngine`] is the single owner of order state. Every
//! operation runs inside a per-order critical section: it validates the
//! requested transition against current state, applies it, stamps the
//! stage timestamp, persists, refreshes the read model and publishes one
//! feed event as an indivisible unit. Transitions on different orders
//! proceed fully in parallel; a request that no longer matches current
//! state fails with [`EngineError::InvalidTransition`] instead of
//! silently overwriting.

pub mod event_bus;

use crate::assignment::{AssignmentBook, AssignmentError};
use crate::projection::{OrderView, ProjectionState};
use crate::state::{OrderStateError, OrderStateMachine};
use chrono::Utc;
use courier_config::{EngineConfig, FeedConfig, RedispatchPolicy};
use courier_directory::{DirectoryError, DirectoryService};
use courier_ledger::{LedgerError, LedgerService};
use courier_storage::StorageService;
use courier_types::{
	truncate_id, Actor, Assignment, AssignmentStatus, EventKind, EventRecord, Order,
	OrderDraft, OrderStatus,
};
use dashmap::DashMap;
use event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Errors reported to callers of engine operations.
///
/// Messages name the precondition that failed so portals can show the
/// actual reason ("order o1 is bound to another agent") rather than a
/// generic failure.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("invalid transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("order not found: {0}")]
	OrderNotFound(String),
	#[error("assignment not found: {0}")]
	AssignmentNotFound(String),
	#[error("assignment {id} has already been resolved ({status})")]
	AssignmentResolved { id: String, status: AssignmentStatus },
	#[error("assignment {0} is not the order's current offer")]
	StaleAssignment(String),
	#[error("agent {0} is not available for dispatch")]
	AgentUnavailable(String),
	#[error("order {0} already has an unresponded assignment")]
	AlreadyAssigned(String),
	#[error("order {0} has no accepted assignment; an agent must accept the offer first")]
	NoAcceptedAssignment(String),
	#[error("order {order_id} is bound to another agent, not {agent_id}")]
	BoundToOtherAgent { order_id: String, agent_id: String },
	#[error("invalid order: {0}")]
	InvalidOrder(String),
	#[error("persistence failure: {0}")]
	Persistence(String),
	#[error("directory error: {0}")]
	Directory(String),
	#[error("ledger error: {0}")]
	Ledger(String),
}

impl From<OrderStateError> for EngineError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::Storage(msg) => EngineError::Persistence(msg),
			OrderStateError::InvalidTransition { from, to } => {
				EngineError::InvalidTransition { from, to }
			}
			OrderStateError::OrderNotFound(id) => EngineError::OrderNotFound(id),
		}
	}
}

impl From<AssignmentError> for EngineError {
	fn from(err: AssignmentError) -> Self {
		match err {
			AssignmentError::Storage(msg) => EngineError::Persistence(msg),
			AssignmentError::NotFound(id) => EngineError::AssignmentNotFound(id),
			AssignmentError::AlreadyResolved { id, status } => {
				EngineError::AssignmentResolved { id, status }
			}
		}
	}
}

impl From<DirectoryError> for EngineError {
	fn from(err: DirectoryError) -> Self {
		EngineError::Directory(err.to_string())
	}
}

impl From<LedgerError> for EngineError {
	fn from(err: LedgerError) -> Self {
		EngineError::Ledger(err.to_string())
	}
}

/// The single owner of order lifecycle state.
///
/// Cheap to clone; all state is shared behind `Arc`s, which is how the
/// expiry timers re-enter the engine.
#[derive(Clone)]
pub struct LifecycleEngine {
	/// Engine policy configuration.
	config: EngineConfig,
	/// Storage-backed state machine for order records.
	state_machine: Arc<OrderStateMachine>,
	/// Persistent record of dispatch offers.
	assignments: Arc<AssignmentBook>,
	/// Read-only delivery agent directory.
	directory: Arc<DirectoryService>,
	/// Commission / delivery charge ledger.
	ledger: Arc<LedgerService>,
	/// Read model refreshed after every commit.
	projection: Arc<ProjectionState>,
	/// Notification feed.
	event_bus: EventBus,
	/// Per-order serialization locks.
	locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
	/// Expiry timers keyed by assignment id.
	timers: Arc<DashMap<String, JoinHandle<()>>>,
}

impl LifecycleEngine {
	/// Creates a new engine over the given services.
	pub fn new(
		config: EngineConfig,
		feed: FeedConfig,
		storage: Arc<StorageService>,
		directory: Arc<DirectoryService>,
		ledger: Arc<LedgerService>,
	) -> Self {
		Self {
			config,
			state_machine: Arc::new(OrderStateMachine::new(storage.clone())),
			assignments: Arc::new(AssignmentBook::new(storage)),
			directory,
			ledger,
			projection: Arc::new(ProjectionState::new()),
			event_bus: EventBus::new(feed.buffer_size),
			locks: Arc::new(DashMap::new()),
			timers: Arc::new(DashMap::new()),
		}
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Creates a new subscription to the notification feed.
	pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
		self.event_bus.subscribe()
	}

	/// Returns the read-model projection.
	pub fn projection(&self) -> &ProjectionState {
		&self.projection
	}

	/// Returns the engine configuration.
	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Number of orders currently holding a serialization lock entry.
	pub fn lock_count(&self) -> usize {
		self.locks.len()
	}

	/// Loads an order directly from storage.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, EngineError> {
		Ok(self.state_machine.get_order(order_id).await?)
	}

	/// Returns every dispatch offer made for an order, oldest first.
	pub async fn offers_for_order(
		&self,
		order_id: &str,
	) -> Result<Vec<Assignment>, EngineError> {
		Ok(self.assignments.offers_for_order(order_id).await?)
	}

	/// Creates a new order from a draft and enters it into the pipeline.
	///
	/// Customer and shop details arrive already snapshotted in the draft;
	/// the engine computes the total and assigns identifiers.
	#[instrument(skip_all, fields(shop = %draft.shop.id))]
	pub async fn submit_order(
		&self,
		draft: OrderDraft,
		actor: Actor,
	) -> Result<Order, EngineError> {
		if draft.items.is_empty() {
			return Err(EngineError::InvalidOrder(
				"order must contain at least one item".into(),
			));
		}
		if draft.items.iter().any(|item| item.quantity == 0) {
			return Err(EngineError::InvalidOrder(
				"line item quantities must be greater than zero".into(),
			));
		}

		let id = uuid::Uuid::new_v4().to_string();
		let now = Utc::now();
		let items_total: rust_decimal::Decimal =
			draft.items.iter().map(|item| item.line_total()).sum();
		let order = Order {
			order_no: format!("ORD-{}", &id[..8]),
			id,
			customer: draft.customer,
			shop: draft.shop,
			items: draft.items,
			total: items_total + draft.delivery_charge,
			delivery_charge: draft.delivery_charge,
			commission: draft.commission,
			payment_status: courier_types::PaymentStatus::Unpaid,
			payment_method: draft.payment_method,
			status: OrderStatus::Pending,
			cancel_reason: None,
			pending_assignment_id: None,
			agent_id: None,
			dispatch_attempts: 0,
			prepared_at: None,
			ready_at: None,
			assigned_at: None,
			picked_up_at: None,
			delivered_at: None,
			cancelled_at: None,
			created_at: now,
			updated_at: now,
		};

		self.state_machine.store_order(&order).await?;
		self.projection.apply_order(&order);
		self.emit(EventRecord::new(
			&order.id,
			EventKind::OrderSubmitted,
			actor,
			snapshot(&order),
		));
		tracing::info!(order_id = %truncate_id(&order.id), "Order submitted");
		Ok(order)
	}

	/// Kitchen starts preparing: pending -> preparing.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn start_preparing(
		&self,
		order_id: &str,
		actor: Actor,
	) -> Result<Order, EngineError> {
		self.simple_transition(order_id, OrderStatus::Preparing, actor)
			.await
	}

	/// Kitchen finished the items: preparing -> prepared.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn mark_prepared(
		&self,
		order_id: &str,
		actor: Actor,
	) -> Result<Order, EngineError> {
		self.simple_transition(order_id, OrderStatus::Prepared, actor)
			.await
	}

	/// Order is packed for handover: prepared -> ready.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn mark_ready(&self, order_id: &str, actor: Actor) -> Result<Order, EngineError> {
		self.simple_transition(order_id, OrderStatus::Ready, actor)
			.await
	}

	/// Offers the order to a delivery agent: ready -> assigned.
	///
	/// Creates a pending [`Assignment`] and arms its expiry timer. Fails
	/// with [`EngineError::AlreadyAssigned`] while an unresponded offer
	/// exists and with [`EngineError::AgentUnavailable`] for inactive or
	/// unknown agents.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), agent_id = %agent_id))]
	pub async fn dispatch(
		&self,
		order_id: &str,
		agent_id: &str,
		actor: Actor,
	) -> Result<Assignment, EngineError> {
		let _guard = self.order_guard(order_id).await;
		let mut order = self.state_machine.get_order(order_id).await?;

		if order.pending_assignment_id.is_some() {
			return Err(EngineError::AlreadyAssigned(order_id.to_string()));
		}
		OrderStateMachine::validate_transition(order.status, OrderStatus::Assigned)?;

		// The order points at no offer, so any pending row in the book is
		// an orphan stranded by a failed dispatch; clear it before making
		// a new offer.
		for stale in self.assignments.offers_for_order(order_id).await? {
			if stale.is_pending() {
				self.withdraw_offer(stale).await;
			}
		}

		let agent = self
			.directory
			.get(agent_id)
			.await?
			.filter(|agent| agent.active)
			.ok_or_else(|| EngineError::AgentUnavailable(agent_id.to_string()))?;

		let assignment = self.assignments.create_offer(order_id, &agent.id).await?;
		let now = Utc::now();
		order.status = OrderStatus::Assigned;
		OrderStateMachine::stamp_transition(&mut order, OrderStatus::Assigned, now);
		order.pending_assignment_id = Some(assignment.id.clone());
		order.dispatch_attempts += 1;
		order.updated_at = now;

		if let Err(e) = self.state_machine.persist_order(&order).await {
			// The offer is already on disk; withdraw it so it can never
			// bind an agent to an order that stayed ready.
			self.withdraw_offer(assignment).await;
			return Err(e.into());
		}
		self.projection.apply_order(&order);
		self.arm_expiry_timer(assignment.id.clone());
		self.emit(EventRecord::new(
			&order.id,
			EventKind::Dispatched {
				assignment_id: assignment.id.clone(),
				agent_id: agent.id.clone(),
			},
			actor,
			serde_json::to_value(&assignment).unwrap_or_default(),
		));
		tracing::info!(
			assignment_id = %truncate_id(&assignment.id),
			attempt = order.dispatch_attempts,
			"Dispatched"
		);
		Ok(assignment)
	}

	/// Records the agent's response to a dispatch offer.
	///
	/// Accepting binds the agent to the order; the order status itself
	/// stays `assigned`. Rejecting frees the order, after which the
	/// configured redispatch policy decides between an automatic new
	/// offer and handing the order back to the dispatch desk.
	#[instrument(skip_all, fields(assignment_id = %truncate_id(assignment_id)))]
	pub async fn respond_to_assignment(
		&self,
		assignment_id: &str,
		accept: bool,
		note: Option<String>,
		actor: Actor,
	) -> Result<Assignment, EngineError> {
		let order_id = self.assignments.get(assignment_id).await?.order_id;
		let _guard = self.order_guard(&order_id).await;

		// Reload under the lock: an expiry may have resolved the offer
		// while we waited.
		let mut assignment = self.assignments.get(assignment_id).await?;
		if !assignment.is_pending() {
			return Err(EngineError::AssignmentResolved {
				id: assignment.id,
				status: assignment.status,
			});
		}
		if let Actor::Agent(responder) = &actor {
			if responder != &assignment.agent_id {
				return Err(EngineError::BoundToOtherAgent {
					order_id: order_id.clone(),
					agent_id: responder.clone(),
				});
			}
		}

		let mut order = self.state_machine.get_order(&order_id).await?;
		// A pending offer the order no longer points at is an orphan from
		// a dispatch whose order write failed; it must never bind an agent.
		if order.pending_assignment_id.as_deref() != Some(assignment_id) {
			return Err(EngineError::StaleAssignment(assignment_id.to_string()));
		}

		// Safe to abort here: the timer task is either still sleeping or
		// waiting on the order lock we hold; it is never mid-commit.
		self.cancel_expiry_timer(assignment_id);
		self.assignments
			.resolve(&mut assignment, accept, note, false)
			.await?;

		if accept {
			let now = Utc::now();
			order.agent_id = Some(assignment.agent_id.clone());
			order.pending_assignment_id = None;
			order.updated_at = now;
			self.state_machine.persist_order(&order).await?;
			self.projection.apply_order(&order);
			self.emit(EventRecord::new(
				&order.id,
				EventKind::AssignmentAccepted {
					assignment_id: assignment.id.clone(),
					agent_id: assignment.agent_id.clone(),
				},
				actor,
				snapshot(&order),
			));
			tracing::info!(agent_id = %assignment.agent_id, "Assignment accepted");
		} else {
			self.emit(EventRecord::new(
				&order.id,
				EventKind::AssignmentRejected {
					assignment_id: assignment.id.clone(),
					agent_id: assignment.agent_id.clone(),
				},
				actor,
				serde_json::to_value(&assignment).unwrap_or_default(),
			));
			tracing::info!(agent_id = %assignment.agent_id, "Assignment rejected");
			self.redispatch_or_release(order).await?;
		}
		Ok(assignment)
	}

	/// Bound agent collects the order: assigned -> picked_up.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn mark_picked_up(
		&self,
		order_id: &str,
		actor: Actor,
	) -> Result<Order, EngineError> {
		let _guard = self.order_guard(order_id).await;
		let mut order = self.state_machine.get_order(order_id).await?;

		OrderStateMachine::validate_transition(order.status, OrderStatus::PickedUp)?;
		self.check_binding(&order, &actor)?;

		let from = order.status;
		let now = Utc::now();
		order.status = OrderStatus::PickedUp;
		OrderStateMachine::stamp_transition(&mut order, OrderStatus::PickedUp, now);
		order.updated_at = now;

		self.state_machine.persist_order(&order).await?;
		self.projection.apply_order(&order);
		self.emit(EventRecord::new(
			&order.id,
			EventKind::StatusChanged {
				from,
				to: OrderStatus::PickedUp,
			},
			actor,
			snapshot(&order),
		));
		Ok(order)
	}

	/// Agent hands the order to the customer: picked_up -> delivered.
	///
	/// Also creates the commission / delivery charge ledger entries. The
	/// ledger writes are keyed per (order, type) and happen before the
	/// order write, so a crash between the two is repaired by retrying
	/// the transition without creating duplicates.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn mark_delivered(
		&self,
		order_id: &str,
		actor: Actor,
	) -> Result<Order, EngineError> {
		let _guard = self.order_guard(order_id).await;
		let mut order = self.state_machine.get_order(order_id).await?;

		OrderStateMachine::validate_transition(order.status, OrderStatus::Delivered)?;
		self.check_binding(&order, &actor)?;

		let from = order.status;
		let now = Utc::now();
		order.status = OrderStatus::Delivered;
		OrderStateMachine::stamp_transition(&mut order, OrderStatus::Delivered, now);
		order.updated_at = now;

		let created = self.ledger.record_delivery(&order).await?;
		self.state_machine.persist_order(&order).await?;
		self.projection.apply_order(&order);
		self.emit(EventRecord::new(
			&order.id,
			EventKind::StatusChanged {
				from,
				to: OrderStatus::Delivered,
			},
			actor,
			snapshot(&order),
		));
		for record in &created {
			self.emit(EventRecord::new(
				&order.id,
				EventKind::PaymentRecorded {
					record_id: record.id.clone(),
				},
				Actor::System,
				serde_json::to_value(record).unwrap_or_default(),
			));
		}
		tracing::info!(ledger_entries = created.len(), "Delivered");
		self.release_lock(order_id);
		Ok(order)
	}

	/// Cancels the order from any non-terminal state.
	///
	/// Idempotent: cancelling an already-cancelled order is a no-op and
	/// emits nothing. A pending dispatch offer is withdrawn and its
	/// timer removed.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(
		&self,
		order_id: &str,
		reason: &str,
		actor: Actor,
	) -> Result<Order, EngineError> {
		let _guard = self.order_guard(order_id).await;
		let mut order = self.state_machine.get_order(order_id).await?;

		if order.status == OrderStatus::Cancelled {
			tracing::debug!("Order already cancelled");
			self.release_lock(order_id);
			return Ok(order);
		}
		OrderStateMachine::validate_transition(order.status, OrderStatus::Cancelled)?;

		let withdrawn = order.pending_assignment_id.take();
		let now = Utc::now();
		order.status = OrderStatus::Cancelled;
		OrderStateMachine::stamp_transition(&mut order, OrderStatus::Cancelled, now);
		order.cancel_reason = Some(reason.to_string());
		order.updated_at = now;

		// Order first: if this write fails the offer stays pending with
		// its timer armed, and a cancel retry finds unchanged state.
		self.state_machine.persist_order(&order).await?;
		self.projection.apply_order(&order);

		if let Some(assignment_id) = withdrawn {
			self.cancel_expiry_timer(&assignment_id);
			match self.assignments.get(&assignment_id).await {
				Ok(mut assignment) if assignment.is_pending() => {
					if let Err(e) = self
						.assignments
						.resolve(&mut assignment, false, Some("order cancelled".into()), false)
						.await
					{
						tracing::error!(
							assignment_id = %truncate_id(&assignment_id),
							error = %e,
							"Failed to withdraw offer for cancelled order"
						);
					}
				}
				Ok(_) => {}
				Err(e) => {
					tracing::error!(
						assignment_id = %truncate_id(&assignment_id),
						error = %e,
						"Failed to load offer for cancelled order"
					);
				}
			}
		}

		self.emit(EventRecord::new(
			&order.id,
			EventKind::OrderCancelled {
				reason: reason.to_string(),
			},
			actor,
			snapshot(&order),
		));
		tracing::info!(reason, "Order cancelled");
		self.release_lock(order_id);
		Ok(order)
	}

	/// Rebuilds the projection from storage and re-arms expiry timers
	/// for offers that were pending at shutdown. Returns the number of
	/// orders loaded.
	pub async fn recover(&self) -> Result<usize, EngineError> {
		let orders = self.state_machine.all_orders().await?;
		for order in &orders {
			self.projection.apply_order(order);
			if let Some(assignment_id) = &order.pending_assignment_id {
				self.arm_expiry_timer(assignment_id.clone());
			}
		}
		tracing::info!(orders = orders.len(), "Recovered engine state");
		Ok(orders.len())
	}

	/// Main loop for a long-running engine process.
	///
	/// Logs feed events (the admin notification bell) until ctrl-c.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut feed = self.event_bus.subscribe();
		loop {
			tokio::select! {
				event = feed.recv() => {
					match event {
						Ok(event) => {
							tracing::info!(
								order_id = %truncate_id(&event.order_id),
								actor = %event.actor,
								kind = ?event.kind,
								"Event"
							);
						}
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							tracing::warn!(skipped, "Feed consumer lagged");
						}
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}
				_ = tokio::signal::ctrl_c() => break,
			}
		}
		Ok(())
	}

	/// Shared commit path for the plain kitchen transitions.
	async fn simple_transition(
		&self,
		order_id: &str,
		to: OrderStatus,
		actor: Actor,
	) -> Result<Order, EngineError> {
		let _guard = self.order_guard(order_id).await;
		let mut order = self.state_machine.get_order(order_id).await?;

		OrderStateMachine::validate_transition(order.status, to)?;
		let from = order.status;
		let now = Utc::now();
		order.status = to;
		OrderStateMachine::stamp_transition(&mut order, to, now);
		order.updated_at = now;

		self.state_machine.persist_order(&order).await?;
		self.projection.apply_order(&order);
		self.emit(EventRecord::new(
			&order.id,
			EventKind::StatusChanged { from, to },
			actor,
			snapshot(&order),
		));
		Ok(order)
	}

	/// Handles an order whose pending offer was rejected or expired.
	///
	/// Called with the per-order lock held and the offer already
	/// resolved. Either makes the next automatic offer or releases the
	/// order back to `ready` for the dispatch desk.
	async fn redispatch_or_release(&self, mut order: Order) -> Result<(), EngineError> {
		if self.config.redispatch_policy == RedispatchPolicy::Auto
			&& order.dispatch_attempts < self.config.max_dispatch_attempts
		{
			let exclude = self.assignments.offered_agents(&order.id).await?;
			match self.directory.next_candidate(&exclude).await? {
				Some(agent) => {
					let assignment =
						self.assignments.create_offer(&order.id, &agent.id).await?;
					let now = Utc::now();
					order.pending_assignment_id = Some(assignment.id.clone());
					order.assigned_at = Some(now);
					order.dispatch_attempts += 1;
					order.updated_at = now;

					if let Err(e) = self.state_machine.persist_order(&order).await {
						self.withdraw_offer(assignment).await;
						return Err(e.into());
					}
					self.projection.apply_order(&order);
					self.arm_expiry_timer(assignment.id.clone());
					self.emit(EventRecord::new(
						&order.id,
						EventKind::Dispatched {
							assignment_id: assignment.id.clone(),
							agent_id: agent.id.clone(),
						},
						Actor::System,
						serde_json::to_value(&assignment).unwrap_or_default(),
					));
					tracing::info!(
						order_id = %truncate_id(&order.id),
						agent_id = %agent.id,
						attempt = order.dispatch_attempts,
						"Auto-redispatched"
					);
					return Ok(());
				}
				None => {
					tracing::warn!(
						order_id = %truncate_id(&order.id),
						"No eligible agent for automatic redispatch"
					);
				}
			}
		}

		// Manual policy, attempts exhausted, or no candidate: release the
		// order back to ready and surface it to the dispatch desk.
		let now = Utc::now();
		order.status = OrderStatus::Ready;
		order.assigned_at = None;
		order.pending_assignment_id = None;
		order.updated_at = now;

		self.state_machine.persist_order(&order).await?;
		self.projection.apply_order(&order);
		self.emit(EventRecord::new(
			&order.id,
			EventKind::RedispatchRequired,
			Actor::System,
			snapshot(&order),
		));
		Ok(())
	}

	/// Expiry path for an unanswered offer; runs on the timer task.
	async fn expire_assignment(&self, assignment_id: &str) -> Result<(), EngineError> {
		let assignment = match self.assignments.get(assignment_id).await {
			Ok(assignment) => assignment,
			Err(AssignmentError::NotFound(_)) => return Ok(()),
			Err(e) => return Err(e.into()),
		};
		let _guard = self.order_guard(&assignment.order_id).await;
		self.timers.remove(assignment_id);

		// A response may have won the race while we waited for the lock.
		let mut assignment = self.assignments.get(assignment_id).await?;
		if !assignment.is_pending() {
			return Ok(());
		}

		self.assignments
			.resolve(
				&mut assignment,
				false,
				Some("no response before timeout".into()),
				true,
			)
			.await?;
		tracing::warn!(
			assignment_id = %truncate_id(&assignment.id),
			order_id = %truncate_id(&assignment.order_id),
			agent_id = %assignment.agent_id,
			"Assignment expired without a response"
		);
		self.emit(EventRecord::new(
			&assignment.order_id,
			EventKind::AssignmentExpired {
				assignment_id: assignment.id.clone(),
				agent_id: assignment.agent_id.clone(),
			},
			Actor::System,
			serde_json::to_value(&assignment).unwrap_or_default(),
		));

		let order = self.state_machine.get_order(&assignment.order_id).await?;
		self.redispatch_or_release(order).await
	}

	/// Arms the response timeout for a pending offer.
	fn arm_expiry_timer(&self, assignment_id: String) {
		let engine = self.clone();
		let timeout = Duration::from_secs(self.config.assignment_timeout_seconds);
		let id = assignment_id.clone();
		let handle = tokio::spawn(async move {
			tokio::time::sleep(timeout).await;
			if let Err(e) = engine.expire_assignment(&id).await {
				tracing::error!(
					assignment_id = %truncate_id(&id),
					error = %e,
					"Failed to expire assignment"
				);
			}
		});
		if let Some(stale) = self.timers.insert(assignment_id, handle) {
			stale.abort();
		}
	}

	/// Removes and aborts the expiry timer for an offer.
	fn cancel_expiry_timer(&self, assignment_id: &str) {
		if let Some((_, handle)) = self.timers.remove(assignment_id) {
			handle.abort();
		}
	}

	/// Withdraws an offer whose order write failed.
	///
	/// Best-effort: an offer that survives this still cannot bind an
	/// agent, because respond refuses offers the order does not point at.
	async fn withdraw_offer(&self, mut assignment: Assignment) {
		let result = self
			.assignments
			.resolve(&mut assignment, false, Some("dispatch aborted".into()), false)
			.await;
		if let Err(e) = result {
			tracing::error!(
				assignment_id = %truncate_id(&assignment.id),
				error = %e,
				"Failed to withdraw offer after order write failure"
			);
		}
	}

	/// Verifies the order is bound to an accepted agent, and that an
	/// agent caller is that agent.
	fn check_binding(&self, order: &Order, actor: &Actor) -> Result<(), EngineError> {
		let bound = match &order.agent_id {
			Some(agent_id) => agent_id,
			None => return Err(EngineError::NoAcceptedAssignment(order.id.clone())),
		};
		if let Actor::Agent(caller) = actor {
			if caller != bound {
				return Err(EngineError::BoundToOtherAgent {
					order_id: order.id.clone(),
					agent_id: caller.clone(),
				});
			}
		}
		Ok(())
	}

	/// Records an event in the projection and publishes it on the feed.
	///
	/// Feed delivery is best-effort; the transition is already durable.
	fn emit(&self, event: EventRecord) {
		self.projection.record_event(&event);
		if self.event_bus.publish(event).is_err() {
			tracing::trace!("No feed subscribers");
		}
	}

	/// Drops the lock entry for a terminal order.
	///
	/// A racing waiter may recreate the entry, but terminal orders only
	/// serve failed-precondition checks, so nothing needs the old one.
	fn release_lock(&self, order_id: &str) {
		self.locks.remove(order_id);
	}

	/// Acquires the serialization lock for one order.
	async fn order_guard(&self, order_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
		let lock = self
			.locks
			.entry(order_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.value()
			.clone();
		lock.lock_owned().await
	}
}

/// JSON snapshot of an order view for event payloads.
fn snapshot(order: &Order) -> serde_json::Value {
	serde_json::to_value(OrderView::from(order)).unwrap_or_default()
}
