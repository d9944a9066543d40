//! Director coordinator (ignition side).
//!
//! Governs the driving-simulator process and its auxiliary subordinates
//! (speed display, lighting, in-car display proxy). In its steady state it
//! races a C&C receive against the scenario deadline to decide between
//! handling a command, entering autonomous driving, or forcing a bounded
//! simulator restart.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::bus::Bus;
use crate::component::{ComponentCommand, ComponentHandler, ComponentStatus};
use crate::config::Config;
use crate::events::{Event, EventBus, Subscription, SCENARIO_TOPIC};
use crate::machine::{MachineError, StateMachine, StateNode, Transition};
use crate::protocol::{
    is_scenario, FramePayload, ERROR_UNSPECIFIED, IGNITION, SCENARIO_BASELINE,
};

pub const SIMULATOR: &str = "simulator";
pub const SPEED_DISPLAY: &str = "speedo";
pub const LIGHTING: &str = "lighting";
pub const DISPLAY_PROXY: &str = "display-proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorState {
    Startup,
    NoncritFailure,
    Ready,
    Terminate,
    SelfDrive,
    Restart,
    Timeout,
    CcMsg,
    CanMsg,
}

#[derive(Debug, Default, Clone, Copy)]
struct DirectorInputs {
    /// A critical subordinate failed to start.
    component_fail: bool,
    /// The lighting controller failed to start (noncritical).
    lighting_fail: bool,
    cc_msg: bool,
    /// Never asserted: in-car CAN traffic is handled by the display proxy
    /// subordinate, not by this state machine.
    can_msg: bool,
    s_timeout: bool,
    self_drive: bool,
    restart_requested: bool,
    restart_failed: bool,
}

struct DirectorCtx {
    bus: Box<dyn Bus>,
    handler: ComponentHandler,
    events_out: EventBus,
    inputs: DirectorInputs,
    pending_frame: Option<crate::protocol::Frame>,
    active_scenario: u32,
    scenario_started: Instant,
    cc_timeout: Duration,
    scenario_timeout: Duration,
    autopilot_hold: Duration,
    max_restart_attempts: u8,
    exiting: bool,
}

impl DirectorCtx {
    fn default_input(&mut self) {
        self.inputs = DirectorInputs::default();
    }

    fn announce(&mut self, payload: FramePayload) {
        if let Err(err) = self.bus.send(&payload.encode()) {
            warn!(%err, ?payload, "C&C announce failed");
        }
    }

    fn start_critical(&mut self, name: &str) -> bool {
        match self.handler.start(name) {
            Ok(ComponentStatus::Ready) => true,
            status => {
                error!(name, ?status, "critical subordinate failed to start");
                self.inputs.lighting_fail = false;
                self.inputs.component_fail = true;
                false
            }
        }
    }

    fn switch_scenario(&mut self, scenario: u32) {
        if !is_scenario(scenario) {
            warn!(scenario, "ignoring switch to unknown scenario");
            return;
        }
        info!(scenario, "active scenario switched");
        self.active_scenario = scenario;
        self.scenario_started = Instant::now();
        self.events_out
            .publish(&Event::new(SCENARIO_TOPIC, &format!("{scenario:#04x}")));
    }

    fn dispatch_cc(&mut self, frame: &crate::protocol::Frame) {
        match FramePayload::decode(frame) {
            Ok(FramePayload::ActiveScenario { scenario }) => {
                self.switch_scenario(u32::from(scenario));
            }
            Ok(FramePayload::RestartTarget { target }) if target == IGNITION => {
                info!("ignition restart requested over C&C");
                self.inputs.restart_requested = true;
            }
            Ok(FramePayload::RestartTarget { target }) => {
                debug!(target, "restart request for another component");
            }
            Ok(FramePayload::HeartbeatReq { sequence }) => {
                self.announce(FramePayload::HeartbeatAck {
                    sender: IGNITION,
                    sequence,
                });
            }
            Ok(FramePayload::HackActive { hack }) => {
                debug!(hack, "hack visualization is the LED manager's concern");
            }
            Ok(other) => {
                debug!(?other, "C&C frame not for the director");
            }
            Err(err) => {
                warn!(%err, raw = ?frame, "dropping undecodable C&C frame");
            }
        }
    }

    /// Bounded restart with recursive retries; exhaustion escalates to
    /// termination via `restart_failed`.
    fn restart_simulator(&mut self, attempts_left: u8) {
        match self.handler.message(SIMULATOR, ComponentCommand::Restart) {
            Ok(ComponentStatus::RestartFinished) => {
                info!("simulator restart finished");
            }
            status => {
                warn!(?status, attempts_left, "simulator restart failed");
                if attempts_left > 0 {
                    self.restart_simulator(attempts_left - 1);
                } else {
                    error!("simulator restart attempts exhausted");
                    self.inputs.restart_failed = true;
                }
            }
        }
    }
}

/// Bring up the subordinate stack: simulator and speed display are
/// critical, the display proxy is started without waiting, lighting
/// failures are survivable.
fn startup_enter(ctx: &mut DirectorCtx) {
    info!("startup state: enter");

    if !ctx.start_critical(SIMULATOR) {
        return;
    }

    // fire-and-forget: the proxy reports through the event channel
    if let Err(err) = ctx.handler.start(DISPLAY_PROXY) {
        debug!(%err, "display proxy not registered");
    }

    if !ctx.start_critical(SPEED_DISPLAY) {
        return;
    }

    match ctx.handler.start(LIGHTING) {
        Ok(ComponentStatus::Ready) => {}
        status => {
            warn!(?status, "lighting controller failed to start");
            ctx.inputs.component_fail = false;
            ctx.inputs.lighting_fail = true;
            return;
        }
    }

    ctx.scenario_started = Instant::now();
    ctx.default_input();
}

fn noncrit_failure_enter(ctx: &mut DirectorCtx) {
    error!("lighting controller unavailable, continuing without it");
    ctx.default_input();
}

/// One receive raced against the scenario deadline.
fn ready_enter(ctx: &mut DirectorCtx) {
    debug!("ready state: enter");
    if ctx.scenario_started.elapsed() >= ctx.scenario_timeout {
        ctx.default_input();
        ctx.inputs.s_timeout = true;
        return;
    }
    match ctx.bus.recv(ctx.cc_timeout) {
        Ok(Some(frame)) => {
            ctx.default_input();
            ctx.pending_frame = Some(frame);
            ctx.inputs.cc_msg = true;
        }
        Ok(None) => {
            ctx.default_input();
            ctx.inputs.self_drive = true;
        }
        Err(err) => {
            warn!(%err, "C&C receive failed");
            ctx.default_input();
        }
    }
}

fn cc_msg_enter(ctx: &mut DirectorCtx) {
    ctx.inputs.cc_msg = false;
    if let Some(frame) = ctx.pending_frame.take() {
        ctx.dispatch_cc(&frame);
    }
}

fn can_msg_enter(ctx: &mut DirectorCtx) {
    debug!("in-car CAN state: enter");
    ctx.default_input();
}

fn self_drive_enter(ctx: &mut DirectorCtx) {
    info!("autonomous driving: enter");
    if let Err(err) = ctx
        .handler
        .message(SIMULATOR, ComponentCommand::EnableAutopilot)
    {
        warn!(%err, "cannot enable autopilot");
    }
    // Blocks the whole coordinator by design; there is no cooperative
    // cancellation of an in-flight entry action.
    std::thread::sleep(ctx.autopilot_hold);
    if let Err(err) = ctx
        .handler
        .message(SIMULATOR, ComponentCommand::DisableAutopilot)
    {
        warn!(%err, "cannot disable autopilot");
    }
    ctx.default_input();
}

fn timeout_enter(ctx: &mut DirectorCtx) {
    info!("scenario timeout: enter");
    ctx.default_input();
}

fn restart_enter(ctx: &mut DirectorCtx) {
    info!("restart state: enter");
    ctx.default_input();
    let attempts = ctx.max_restart_attempts;
    ctx.restart_simulator(attempts);
    ctx.scenario_started = Instant::now();
}

fn terminate_enter(ctx: &mut DirectorCtx) {
    info!("termination state: enter");
    ctx.announce(FramePayload::ComponentError {
        component: IGNITION,
        error_code: ERROR_UNSPECIFIED,
    });
    ctx.handler.exit();
    ctx.exiting = true;
}

fn states() -> Vec<StateNode<DirectorState, DirectorCtx>> {
    vec![
        StateNode {
            id: DirectorState::Startup,
            on_enter: Some(startup_enter),
        },
        StateNode {
            id: DirectorState::NoncritFailure,
            on_enter: Some(noncrit_failure_enter),
        },
        StateNode {
            id: DirectorState::Ready,
            on_enter: Some(ready_enter),
        },
        StateNode {
            id: DirectorState::Terminate,
            on_enter: Some(terminate_enter),
        },
        StateNode {
            id: DirectorState::SelfDrive,
            on_enter: Some(self_drive_enter),
        },
        StateNode {
            id: DirectorState::Restart,
            on_enter: Some(restart_enter),
        },
        StateNode {
            id: DirectorState::Timeout,
            on_enter: Some(timeout_enter),
        },
        StateNode {
            id: DirectorState::CcMsg,
            on_enter: Some(cc_msg_enter),
        },
        StateNode {
            id: DirectorState::CanMsg,
            on_enter: Some(can_msg_enter),
        },
    ]
}

fn transitions() -> Vec<Transition<DirectorState, DirectorCtx>> {
    use DirectorState::*;
    vec![
        // startup outcomes
        Transition::new(Startup, NoncritFailure)
            .when(|c: &DirectorCtx| c.inputs.lighting_fail)
            .unless(|c: &DirectorCtx| c.inputs.component_fail),
        Transition::new(Startup, Terminate).when(|c: &DirectorCtx| c.inputs.component_fail),
        Transition::new(Startup, Ready)
            .unless(|c: &DirectorCtx| c.inputs.component_fail)
            .unless(|c: &DirectorCtx| c.inputs.lighting_fail),
        Transition::new(NoncritFailure, Ready),
        // steady state: the receive/deadline race picks exactly one input
        Transition::new(Ready, Ready)
            .unless(|c: &DirectorCtx| c.inputs.s_timeout)
            .unless(|c: &DirectorCtx| c.inputs.cc_msg)
            .unless(|c: &DirectorCtx| c.inputs.can_msg)
            .unless(|c: &DirectorCtx| c.inputs.self_drive),
        Transition::new(Ready, SelfDrive)
            .when(|c: &DirectorCtx| c.inputs.self_drive)
            .unless(|c: &DirectorCtx| c.inputs.cc_msg)
            .unless(|c: &DirectorCtx| c.inputs.can_msg)
            .unless(|c: &DirectorCtx| c.inputs.s_timeout),
        Transition::new(Ready, Timeout).when(|c: &DirectorCtx| c.inputs.s_timeout),
        Transition::new(Ready, CcMsg)
            .when(|c: &DirectorCtx| c.inputs.cc_msg)
            .unless(|c: &DirectorCtx| c.inputs.s_timeout),
        Transition::new(Ready, CanMsg)
            .when(|c: &DirectorCtx| c.inputs.can_msg)
            .unless(|c: &DirectorCtx| c.inputs.cc_msg)
            .unless(|c: &DirectorCtx| c.inputs.s_timeout),
        Transition::new(Timeout, Restart),
        Transition::new(Restart, Terminate).when(|c: &DirectorCtx| c.inputs.restart_failed),
        Transition::new(Restart, Ready),
        Transition::new(CanMsg, Ready),
        Transition::new(SelfDrive, Restart),
        Transition::new(CcMsg, Restart).when(|c: &DirectorCtx| c.inputs.restart_requested),
        Transition::new(CcMsg, Ready),
    ]
}

pub struct Director {
    machine: StateMachine<DirectorState, DirectorCtx>,
    ctx: DirectorCtx,
}

impl Director {
    /// Build a director over an already-connected C&C bus and a handler
    /// pre-loaded with its subordinate components.
    pub fn new(
        bus: Box<dyn Bus>,
        handler: ComponentHandler,
        config: &Config,
    ) -> Result<Self, MachineError> {
        let ctx = DirectorCtx {
            bus,
            handler,
            events_out: EventBus::new(),
            inputs: DirectorInputs::default(),
            pending_frame: None,
            active_scenario: SCENARIO_BASELINE,
            scenario_started: Instant::now(),
            cc_timeout: config.timing.director_cc_timeout(),
            scenario_timeout: config.timing.scenario_timeout(),
            autopilot_hold: config.timing.autopilot_hold(),
            max_restart_attempts: config.timing.max_restart_attempts,
            exiting: false,
        };
        let machine = StateMachine::new(states(), transitions(), DirectorState::Startup)?;
        Ok(Self { machine, ctx })
    }

    pub fn tick(&mut self) -> DirectorState {
        self.machine.advance(&mut self.ctx)
    }

    pub fn state(&self) -> DirectorState {
        self.machine.state()
    }

    pub fn is_exiting(&self) -> bool {
        self.ctx.exiting
    }

    pub fn active_scenario(&self) -> u32 {
        self.ctx.active_scenario
    }

    /// Subscribe to the internal events this director publishes to its
    /// subordinates.
    pub fn subscribe_events(&mut self) -> Subscription {
        self.ctx.events_out.subscribe()
    }
}
