//! Commander coordinator.
//!
//! Governs the fleet of vehicle ECU targets from the admin side of the C&C
//! channel: announces its own readiness, fields restart requests from the
//! kiosk, drives reset directives to the target supervisors over the
//! internal event channel, and tracks per-target lifecycle status.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::bus::Bus;
use crate::config::Config;
use crate::events::{ComponentEvent, Event, EventBus, Subscription};
use crate::machine::{MachineError, StateMachine, StateNode, Transition};
use crate::protocol::{
    component_name, FramePayload, COMMAND_TOOL, ERROR_UNSPECIFIED, SUPERVISOR_MCU, TARGET_1,
    TARGET_2, TARGET_3, TARGET_4, TARGET_5, TARGET_6,
};
use crate::registry::{TargetRegistry, TargetStatus};

/// Targets governed by the commander, in registry (index) order. The
/// supervisor MCU occupies index 0 so that ECU targets keep their 1-based
/// event indexes.
pub const DEFAULT_TARGETS: [u32; 7] = [
    SUPERVISOR_MCU,
    TARGET_1,
    TARGET_2,
    TARGET_3,
    TARGET_4,
    TARGET_5,
    TARGET_6,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommanderState {
    Boot,
    Ready,
    RestartTarget,
    FailureRecovery,
    DegradedMode,
    Terminate,
}

#[derive(Debug, Default, Clone, Copy)]
struct CommanderInputs {
    target_reset_requested: bool,
    target_error: bool,
    restart_ok: bool,
    /// Declared but never asserted: the restart failure detector is an
    /// unfinished path and fails closed in RestartTarget.
    restart_failed: bool,
    recovery_possible: bool,
    degraded_mode_possible: bool,
}

struct CommanderCtx {
    bus: Box<dyn Bus>,
    registry: TargetRegistry,
    events_out: EventBus,
    report_rx: Receiver<Event>,
    inputs: CommanderInputs,
    cc_timeout: Duration,
    ready_announce_interval: Duration,
    last_ready_announce: Option<Instant>,
    heartbeat_sequence: u32,
    exiting: bool,
}

impl CommanderCtx {
    fn announce(&mut self, payload: FramePayload) {
        if let Err(err) = self.bus.send(&payload.encode()) {
            warn!(%err, ?payload, "C&C announce failed");
        }
    }

    /// Periodic self-readiness announce, at most once per configured
    /// interval; heartbeat requests ride the same cadence.
    fn announce_ready_if_due(&mut self) {
        let due = self
            .last_ready_announce
            .map_or(true, |at| at.elapsed() >= self.ready_announce_interval);
        if !due {
            return;
        }
        self.last_ready_announce = Some(Instant::now());
        self.announce(FramePayload::ComponentReady {
            component: COMMAND_TOOL,
        });
        self.heartbeat_sequence = self.heartbeat_sequence.wrapping_add(1);
        let sequence = self.heartbeat_sequence;
        self.announce(FramePayload::HeartbeatReq { sequence });
    }

    /// Restart request for `target` (from the bus or a peer coordinator).
    /// A target already waiting on a reset is left alone: at most one
    /// restart may be in flight per target.
    fn process_restart_request(&mut self, target: u32) {
        match self.registry.status(target) {
            Err(err) => {
                warn!(%err, "ignoring restart request");
            }
            Ok(TargetStatus::Wait) => {
                info!(
                    target = component_name(target).unwrap_or("?"),
                    "restart already in flight, ignoring request"
                );
            }
            Ok(_) => {
                info!(
                    target = component_name(target).unwrap_or("?"),
                    "target restart requested"
                );
                let _ = self.registry.set_status(target, TargetStatus::Reset);
                self.inputs.target_reset_requested = true;
            }
        }
    }

    /// A target reported an error: schedule a fresh reset cycle for it.
    fn process_target_error(&mut self, target: u32) {
        if !self.registry.contains(target) {
            debug!(target, "error report for unmanaged component");
            return;
        }
        warn!(
            target = component_name(target).unwrap_or("?"),
            "target error reported"
        );
        let _ = self.registry.set_status(target, TargetStatus::Reset);
        self.inputs.target_error = true;
    }

    fn dispatch_cc(&mut self, frame: &crate::protocol::Frame) {
        match FramePayload::decode(frame) {
            Ok(FramePayload::RestartTarget { target }) => self.process_restart_request(target),
            Ok(FramePayload::ComponentError { component, .. }) => {
                self.process_target_error(component);
            }
            Ok(FramePayload::ComponentReady { component }) => {
                debug!(component, "peer ready announce");
            }
            Ok(FramePayload::HeartbeatAck { sender, sequence }) => {
                debug!(sender, sequence, "heartbeat ack");
            }
            Ok(other) => {
                debug!(?other, "C&C frame not for the commander");
            }
            Err(err) => {
                warn!(%err, raw = ?frame, "dropping undecodable C&C frame");
            }
        }
    }

    fn handle_report(&mut self, event: &Event) {
        match ComponentEvent::parse(event) {
            Some(ComponentEvent::Ready(idx)) => {
                let Some(target) = self.registry.target_at(idx as usize) else {
                    warn!(idx, "READY report for unknown target index");
                    return;
                };
                let _ = self.registry.set_status(target, TargetStatus::Ready);
                self.inputs.restart_ok = true;
                self.announce(FramePayload::ComponentReady { component: target });
            }
            Some(ComponentEvent::Error(idx)) => {
                let Some(target) = self.registry.target_at(idx as usize) else {
                    warn!(idx, "ERROR report for unknown target index");
                    return;
                };
                let _ = self.registry.set_status(target, TargetStatus::Reset);
                self.inputs.target_reset_requested = true;
            }
            Some(ComponentEvent::Reset(_)) | None => {
                debug!(?event, "unhandled internal event");
            }
        }
    }
}

fn boot_enter(_ctx: &mut CommanderCtx) {
    info!("commander booted");
}

/// Steady state: announce, then drain one C&C frame per tick.
fn ready_enter(ctx: &mut CommanderCtx) {
    ctx.announce_ready_if_due();
    match ctx.bus.recv(ctx.cc_timeout) {
        Ok(Some(frame)) => ctx.dispatch_cc(&frame),
        Ok(None) => {}
        Err(err) => warn!(%err, "C&C receive failed"),
    }
}

/// Dispatch a reset directive for every target marked RESET and park it in
/// WAIT until the supervisor reports back.
fn restart_target_enter(ctx: &mut CommanderCtx) {
    ctx.inputs.target_reset_requested = false;
    ctx.inputs.target_error = false;
    ctx.inputs.restart_ok = false;

    let pending: Vec<u32> = ctx.registry.with_status(TargetStatus::Reset).collect();
    for target in pending {
        let Some(idx) = ctx.registry.index_of(target) else {
            continue;
        };
        info!(
            target = component_name(target).unwrap_or("?"),
            "initiating target reset"
        );
        ctx.events_out
            .publish(&ComponentEvent::Reset(idx as u32).to_event());
        let _ = ctx.registry.set_status(target, TargetStatus::Wait);
    }
}

fn failure_recovery_enter(_ctx: &mut CommanderCtx) {
    warn!("attempting failure recovery");
}

fn degraded_mode_enter(_ctx: &mut CommanderCtx) {
    // Reachable but unimplemented: stay here rather than improvising.
    error!("degraded mode not implemented");
}

fn terminate_enter(ctx: &mut CommanderCtx) {
    ctx.announce(FramePayload::ComponentError {
        component: COMMAND_TOOL,
        error_code: ERROR_UNSPECIFIED,
    });
    info!("commander terminating");
    ctx.exiting = true;
}

fn states() -> Vec<StateNode<CommanderState, CommanderCtx>> {
    vec![
        StateNode {
            id: CommanderState::Boot,
            on_enter: Some(boot_enter),
        },
        StateNode {
            id: CommanderState::Ready,
            on_enter: Some(ready_enter),
        },
        StateNode {
            id: CommanderState::RestartTarget,
            on_enter: Some(restart_target_enter),
        },
        StateNode {
            id: CommanderState::FailureRecovery,
            on_enter: Some(failure_recovery_enter),
        },
        StateNode {
            id: CommanderState::DegradedMode,
            on_enter: Some(degraded_mode_enter),
        },
        StateNode {
            id: CommanderState::Terminate,
            on_enter: Some(terminate_enter),
        },
    ]
}

fn transitions() -> Vec<Transition<CommanderState, CommanderCtx>> {
    use CommanderState::*;
    vec![
        Transition::new(Boot, Ready),
        Transition::new(Ready, RestartTarget).when(|c: &CommanderCtx| c.inputs.target_reset_requested),
        Transition::new(Ready, RestartTarget).when(|c: &CommanderCtx| c.inputs.target_error),
        Transition::new(Ready, Ready)
            .unless(|c: &CommanderCtx| c.inputs.target_reset_requested)
            .unless(|c: &CommanderCtx| c.inputs.target_error),
        Transition::new(RestartTarget, Ready).when(|c: &CommanderCtx| c.inputs.target_reset_requested),
        Transition::new(RestartTarget, Ready).when(|c: &CommanderCtx| c.inputs.restart_ok),
        Transition::new(RestartTarget, FailureRecovery).when(|c: &CommanderCtx| c.inputs.restart_failed),
        Transition::new(FailureRecovery, DegradedMode).when(|c: &CommanderCtx| c.inputs.recovery_possible),
        Transition::new(FailureRecovery, Terminate).unless(|c: &CommanderCtx| c.inputs.recovery_possible),
        Transition::new(DegradedMode, Ready).when(|c: &CommanderCtx| c.inputs.degraded_mode_possible),
    ]
}

pub struct Commander {
    machine: StateMachine<CommanderState, CommanderCtx>,
    ctx: CommanderCtx,
    report_tx: Sender<Event>,
}

impl Commander {
    /// Build a commander over an already-connected C&C bus, governing
    /// [`DEFAULT_TARGETS`].
    pub fn new(bus: Box<dyn Bus>, config: &Config) -> Result<Self, MachineError> {
        Self::with_targets(bus, config, &DEFAULT_TARGETS)
    }

    pub fn with_targets(
        bus: Box<dyn Bus>,
        config: &Config,
        targets: &[u32],
    ) -> Result<Self, MachineError> {
        let mut registry = TargetRegistry::new();
        for &target in targets {
            registry.register(target);
        }
        let (report_tx, report_rx) = mpsc::channel();
        let ctx = CommanderCtx {
            bus,
            registry,
            events_out: EventBus::new(),
            report_rx,
            inputs: CommanderInputs::default(),
            cc_timeout: config.timing.cc_timeout(),
            ready_announce_interval: config.timing.ready_announce_interval(),
            last_ready_announce: None,
            heartbeat_sequence: 0,
            exiting: false,
        };
        let machine = StateMachine::new(states(), transitions(), CommanderState::Boot)?;
        Ok(Self {
            machine,
            ctx,
            report_tx,
        })
    }

    /// One poll tick: drain subordinate reports, then advance the machine.
    pub fn tick(&mut self) -> CommanderState {
        while let Ok(event) = self.ctx.report_rx.try_recv() {
            self.ctx.handle_report(&event);
        }
        self.machine.advance(&mut self.ctx)
    }

    pub fn state(&self) -> CommanderState {
        self.machine.state()
    }

    pub fn is_exiting(&self) -> bool {
        self.ctx.exiting
    }

    /// Handle for subordinates (or a watchdog thread) to submit lifecycle
    /// reports; they are consumed at the top of the next tick.
    pub fn report_sender(&self) -> Sender<Event> {
        self.report_tx.clone()
    }

    /// Subscribe to the reset directives this commander publishes.
    pub fn subscribe_events(&mut self) -> Subscription {
        self.ctx.events_out.subscribe()
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.ctx.registry
    }

    /// Direct restart-request entry point, equivalent to receiving a
    /// CMD_RESTART frame for `target`.
    pub fn process_restart_request(&mut self, target: u32) {
        self.ctx.process_restart_request(target);
    }
}
