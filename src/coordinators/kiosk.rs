//! Hacker kiosk coordinator.
//!
//! Walks a visitor through the attack demonstration: baseline infotainment
//! compromise, critical ECU exploits, then the hardened scenarios where the
//! same attacks fail. Driven by named button submissions from the kiosk UI
//! rather than bus frames; every submission produces a structured response
//! record handed back to the caller synchronously.
//!
//! Scenario layout:
//!
//! 1. BASELINE — stock ECU + stock infotainment server
//! 2. SECURE_INFOTAINMENT — hardened infotainment server
//! 3. SECURE_ECU — hardened ECU, stock infotainment

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::config::Config;
use crate::machine::{MachineError, StateMachine, StateNode, Transition};
use crate::ota::OtaClient;
use crate::protocol::{
    FramePayload, BUTTON_STATION_1, BUTTON_STATION_2, BUTTON_STATION_3, BUTTON_VOLUME_DOWN,
    BUTTON_VOLUME_UP, HACK_BRAKE, HACK_INFOTAINMENT_1, HACK_LKAS, HACK_NONE, HACK_THROTTLE,
    HACK_TRANSMISSION, INFOTAINMENT_SERVER_1, INFOTAINMENT_SERVER_3, SCENARIO_BASELINE,
    SCENARIO_SECURE_ECU, SCENARIO_SECURE_INFOTAINMENT, TARGET_1,
};

pub const STATUS_OK: u16 = 200;
pub const STATUS_UNEXPECTED_FAILURE: u16 = 500;
pub const STATUS_NOT_IMPLEMENTED: u16 = 501;

// Payload binaries staged on the OTA servers.
const INFO_SERVER_HACKED: &str = "infotainment-server/hacked_server";
const BRAKES_NOMINAL: &str = "ecu_payloads/brakesNominal";
const BRAKES_HACKED: &str = "ecu_payloads/brakesHacked";
const THROTTLE_NOMINAL: &str = "ecu_payloads/throttleNominal";
const THROTTLE_HACKED: &str = "ecu_payloads/throttleHacked";
const LKAS_NOMINAL: &str = "ecu_payloads/lkasNominal";
const LKAS_HACKED: &str = "ecu_payloads/lkasHacked";
const TRANSMISSION_NOMINAL: &str = "ecu_payloads/transmissionNominal";
const TRANSMISSION_HACKED: &str = "ecu_payloads/transmissionHacked";

/// How long an idle tick listens on the C&C channel.
const IDLE_CC_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskState {
    Reset,
    Hack02KioskIntro,
    Hack05InfoAttempt,
    Hack06InfoExploit,
    Hack06InfoExploitAttemptHack,
    Hack08CriticalExploit,
    Hack09Protect,
    Hack10ProtectInfoAttempt,
    Hack10InfoExploitAttemptHack,
    Hack12ProtectCritical,
    Hack12CriticalExploit,
}

/// Buttons the kiosk UI can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Button {
    Next,
    Reset,
    InfoExploit,
    CriticalExploit,
    SsithInfotainment,
    SsithEcu,
}

impl Button {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "next" => Some(Button::Next),
            "reset" => Some(Button::Reset),
            "info_exploit" => Some(Button::InfoExploit),
            "critical_exploit" => Some(Button::CriticalExploit),
            "ssith_infotainment" => Some(Button::SsithInfotainment),
            "ssith_ecu" => Some(Button::SsithEcu),
            _ => None,
        }
    }
}

/// External request: `{func: button name, args: optional argument}`.
#[derive(Debug, Clone, Deserialize)]
pub struct KioskRequest {
    pub func: String,
    #[serde(default)]
    pub args: Option<Value>,
}

/// Structured response record returned for every submission.
#[derive(Debug, Clone, Serialize)]
pub struct KioskResponse {
    pub status: u16,
    pub retval: Value,
}

impl KioskResponse {
    fn ok() -> Self {
        Self {
            status: STATUS_OK,
            retval: Value::Null,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct KioskInputs {
    next: bool,
    reset: bool,
    info_exploit: bool,
    critical_exploit: bool,
    ssith_infotainment: bool,
    ssith_ecu: bool,
    exploit_complete: bool,
}

struct KioskCtx {
    cmd_bus: Box<dyn Bus>,
    info_bus: Box<dyn Bus>,
    ota: Box<dyn OtaClient>,
    ota_urls: [(u32, String); 3],
    inputs: KioskInputs,
    state_arg: Option<String>,
    response: KioskResponse,
    active_scenario: u32,
    brakes_ok: bool,
    throttle_ok: bool,
    transmission_ok: bool,
    lkas_disabled: bool,
    hack12_initialized: bool,
}

impl KioskCtx {
    fn announce_cmd(&mut self, payload: FramePayload) {
        if let Err(err) = self.cmd_bus.send(&payload.encode()) {
            warn!(%err, ?payload, "C&C announce failed");
        }
    }

    fn reset_ecu_state(&mut self) {
        self.brakes_ok = true;
        self.throttle_ok = true;
        self.transmission_ok = true;
        self.lkas_disabled = true;
    }

    /// Switch the active scenario: reset the ECU toggles, retarget the OTA
    /// client, and broadcast the change to every peer.
    fn switch_active_scenario(&mut self, scenario: u32) {
        self.active_scenario = scenario;
        self.reset_ecu_state();
        let url = self
            .ota_urls
            .iter()
            .find(|(s, _)| *s == scenario)
            .map(|(_, url)| url.clone());
        match url {
            Some(url) => self.ota.retarget(&url),
            None => warn!(scenario, "no OTA server for scenario"),
        }
        self.announce_cmd(FramePayload::ActiveScenario {
            scenario: scenario as u8,
        });
    }

    /// Notify peers that a component restart is wanted (the commander does
    /// the actual restart).
    fn restart_component(&mut self, component: u32) {
        self.announce_cmd(FramePayload::RestartTarget { target: component });
    }

    /// Notify peers about the active hack (the LED manager changes its
    /// pattern on this).
    fn hack_active(&mut self, hack: u32) {
        self.announce_cmd(FramePayload::HackActive { hack: hack as u8 });
    }

    /// Mimic an infotainment thin client: press a button on the hacked
    /// server over the filtered point-to-point channel.
    fn button_pressed(&mut self, button: u32) {
        let payload = FramePayload::ButtonPressed {
            button: button as u8,
        };
        if let Err(err) = self.info_bus.send(&payload.encode()) {
            warn!(%err, ?payload, "infotainment send failed");
        }
    }

    /// Compromise the OTA server, then upload and launch the hacked
    /// infotainment server binary.
    fn hack_ota_and_upload_info_server(&mut self) -> bool {
        info!("attempting to hack the OTA server");
        let (hack_ok, data) = self.ota.hack_server();
        if !hack_ok {
            info!(%data, "OTA hack failed");
            return false;
        }
        info!("OTA hack successful, uploading hacked infotainment server");
        let (upload_ok, data) = self.ota.upload_and_execute(INFO_SERVER_HACKED);
        if !upload_ok {
            info!(%data, "upload failed");
        }
        upload_ok
    }

    fn execute_infotainment_hack(&mut self) {
        self.hack_active(HACK_INFOTAINMENT_1);
        let arg = self.state_arg.take().unwrap_or_default();
        match arg.as_str() {
            "volumeUp" => {
                self.button_pressed(BUTTON_VOLUME_UP);
                self.response.retval = json!("Volume increased");
            }
            "volumeDown" => {
                self.button_pressed(BUTTON_VOLUME_DOWN);
                self.response.retval = json!("Volume decreased");
            }
            "changeStation_1" => {
                self.button_pressed(BUTTON_STATION_1);
                self.response.retval = json!(1);
            }
            "changeStation_2" => {
                self.button_pressed(BUTTON_STATION_2);
                self.response.retval = json!(2);
            }
            "changeStation_3" => {
                self.button_pressed(BUTTON_STATION_3);
                self.response.retval = json!(3);
            }
            "exfil" => {
                // Position exfiltration needs a listener on the in-car
                // position frames; not wired up yet, so fail closed.
                warn!("position exfiltration not implemented");
                self.response.retval = json!("exfiltration not implemented");
            }
            other => {
                warn!(arg = other, "unknown infotainment exploit");
                self.response.retval = json!("Error");
            }
        }
    }

    /// Upload the counterpart payload for one ECU function and flip its
    /// state on success, returning the new "is nominal" value.
    fn toggle_ecu_payload(&mut self, is_nominal: bool, hacked: &str, nominal: &str) -> bool {
        let path = if is_nominal { hacked } else { nominal };
        let (upload_ok, data) = self.ota.upload_and_execute(path);
        if upload_ok {
            !is_nominal
        } else {
            debug!(%data, "ECU payload upload failed");
            is_nominal
        }
    }

    fn execute_ecu_hack(&mut self) {
        let arg = self.state_arg.take().unwrap_or_default();
        match arg.as_str() {
            "brakes" => {
                self.brakes_ok = self.toggle_ecu_payload(self.brakes_ok, BRAKES_HACKED, BRAKES_NOMINAL);
                self.response.retval = json!(self.brakes_ok);
                let hack = if self.brakes_ok { HACK_NONE } else { HACK_BRAKE };
                self.hack_active(hack);
            }
            "throttle" => {
                self.throttle_ok =
                    self.toggle_ecu_payload(self.throttle_ok, THROTTLE_HACKED, THROTTLE_NOMINAL);
                self.response.retval = json!(self.throttle_ok);
                let hack = if self.throttle_ok { HACK_NONE } else { HACK_THROTTLE };
                self.hack_active(hack);
            }
            "lkas" => {
                // inverted sense: disabled lane keeping is the nominal state
                self.lkas_disabled =
                    self.toggle_ecu_payload(self.lkas_disabled, LKAS_HACKED, LKAS_NOMINAL);
                self.response.retval = json!(self.lkas_disabled);
                let hack = if self.lkas_disabled { HACK_NONE } else { HACK_LKAS };
                self.hack_active(hack);
            }
            "transmission" => {
                self.transmission_ok = self.toggle_ecu_payload(
                    self.transmission_ok,
                    TRANSMISSION_HACKED,
                    TRANSMISSION_NOMINAL,
                );
                self.response.retval = json!(self.transmission_ok);
                let hack = if self.transmission_ok {
                    HACK_NONE
                } else {
                    HACK_TRANSMISSION
                };
                self.hack_active(hack);
            }
            other => {
                warn!(arg = other, "unknown ECU exploit");
                self.response.retval = json!(false);
            }
        }
    }
}

/// Back to the baseline scenario with no active hack; the baseline target
/// and both touched infotainment servers get restarted.
fn reset_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: reset");
    ctx.inputs.next = false;
    ctx.inputs.reset = false;

    ctx.hack_active(HACK_NONE);
    ctx.switch_active_scenario(SCENARIO_BASELINE);
    ctx.restart_component(TARGET_1);
    ctx.restart_component(INFOTAINMENT_SERVER_1);
    ctx.restart_component(INFOTAINMENT_SERVER_3);

    ctx.hack12_initialized = false;
    ctx.response.status = STATUS_OK;
}

fn hack02_kiosk_intro_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack02_kiosk_intro");
    ctx.inputs.next = false;
    ctx.response.status = STATUS_OK;
}

fn hack05_info_attempt_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack05_info_attempt");
    ctx.inputs.next = false;
    let hack_ok = ctx.hack_ota_and_upload_info_server();
    ctx.response.retval = json!(hack_ok);
    ctx.response.status = STATUS_OK;
}

/// Exploit hub: wait for the visitor to pick an exploit.
fn hack06_info_exploit_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack06_info_exploit");
    ctx.inputs.next = false;
    ctx.inputs.exploit_complete = false;
    ctx.response.status = STATUS_OK;
}

fn hack06_info_exploit_attempt_hack_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack06_info_exploit_attempt_hack");
    ctx.inputs.info_exploit = false;
    ctx.inputs.exploit_complete = true;
    ctx.execute_infotainment_hack();
    ctx.response.status = STATUS_OK;
}

fn hack08_critical_exploit_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack08_critical_exploit");
    ctx.inputs.critical_exploit = false;
    ctx.inputs.exploit_complete = true;
    ctx.execute_ecu_hack();
    ctx.response.status = STATUS_OK;
}

/// Switch to the hardened infotainment scenario.
fn hack09_protect_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack09_protect");
    ctx.inputs.next = false;
    ctx.hack_active(HACK_NONE);
    ctx.switch_active_scenario(SCENARIO_SECURE_INFOTAINMENT);
    ctx.response.status = STATUS_OK;
}

fn hack10_protect_info_attempt_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack10_protect_info_attempt");
    ctx.inputs.ssith_infotainment = false;
    let (hack_ok, data) = ctx.ota.hack_server();
    info!(%data, "OTA hack against hardened server");
    ctx.response.retval = json!(hack_ok);
    ctx.response.status = STATUS_OK;
}

fn hack10_info_exploit_attempt_hack_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack10_info_exploit_attempt_hack");
    ctx.inputs.info_exploit = false;
    ctx.inputs.exploit_complete = true;
    ctx.execute_infotainment_hack();
    // The hardened server never ran the hacked binary, so whatever the
    // exploit claims, it failed.
    ctx.response.retval = json!("Hack Failed");
    ctx.response.status = STATUS_OK;
}

/// Switch to the hardened ECU scenario once per walkthrough.
fn hack12_protect_critical_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack12_protect_critical");
    ctx.inputs.ssith_ecu = false;
    if !ctx.hack12_initialized {
        ctx.switch_active_scenario(SCENARIO_SECURE_ECU);
        let (hack_ok, data) = ctx.ota.hack_server();
        info!(hack_ok, %data, "OTA hack in hardened ECU scenario");
        ctx.hack12_initialized = true;
    }
    ctx.response.status = STATUS_OK;
}

fn hack12_critical_exploit_enter(ctx: &mut KioskCtx) {
    info!("kiosk state: hack12_critical_exploit");
    ctx.inputs.critical_exploit = false;
    ctx.inputs.exploit_complete = true;
    ctx.execute_ecu_hack();
    // the hardened ECU rejects the payload regardless of the upload result
    ctx.response.retval = json!(false);
    ctx.response.status = STATUS_OK;
}

fn states() -> Vec<StateNode<KioskState, KioskCtx>> {
    use KioskState::*;
    vec![
        StateNode { id: Reset, on_enter: Some(reset_enter) },
        StateNode { id: Hack02KioskIntro, on_enter: Some(hack02_kiosk_intro_enter) },
        StateNode { id: Hack05InfoAttempt, on_enter: Some(hack05_info_attempt_enter) },
        StateNode { id: Hack06InfoExploit, on_enter: Some(hack06_info_exploit_enter) },
        StateNode {
            id: Hack06InfoExploitAttemptHack,
            on_enter: Some(hack06_info_exploit_attempt_hack_enter),
        },
        StateNode { id: Hack08CriticalExploit, on_enter: Some(hack08_critical_exploit_enter) },
        StateNode { id: Hack09Protect, on_enter: Some(hack09_protect_enter) },
        StateNode {
            id: Hack10ProtectInfoAttempt,
            on_enter: Some(hack10_protect_info_attempt_enter),
        },
        StateNode {
            id: Hack10InfoExploitAttemptHack,
            on_enter: Some(hack10_info_exploit_attempt_hack_enter),
        },
        StateNode { id: Hack12ProtectCritical, on_enter: Some(hack12_protect_critical_enter) },
        StateNode { id: Hack12CriticalExploit, on_enter: Some(hack12_critical_exploit_enter) },
    ]
}

fn transitions() -> Vec<Transition<KioskState, KioskCtx>> {
    use KioskState::*;
    vec![
        Transition::new(Reset, Reset).when(|c: &KioskCtx| c.inputs.reset),
        Transition::new(Reset, Hack02KioskIntro).when(|c: &KioskCtx| c.inputs.next),
        Transition::new(Hack02KioskIntro, Hack05InfoAttempt).when(|c: &KioskCtx| c.inputs.next),
        Transition::new(Hack05InfoAttempt, Hack06InfoExploit).when(|c: &KioskCtx| c.inputs.next),
        Transition::new(Hack06InfoExploit, Hack06InfoExploitAttemptHack)
            .when(|c: &KioskCtx| c.inputs.info_exploit),
        Transition::new(Hack06InfoExploitAttemptHack, Hack06InfoExploit)
            .when(|c: &KioskCtx| c.inputs.exploit_complete),
        Transition::new(Hack06InfoExploit, Hack08CriticalExploit)
            .when(|c: &KioskCtx| c.inputs.critical_exploit),
        Transition::new(Hack08CriticalExploit, Hack06InfoExploit)
            .when(|c: &KioskCtx| c.inputs.exploit_complete),
        Transition::new(Hack06InfoExploit, Hack09Protect).when(|c: &KioskCtx| c.inputs.next),
        Transition::new(Hack09Protect, Hack10ProtectInfoAttempt)
            .when(|c: &KioskCtx| c.inputs.ssith_infotainment),
        Transition::new(Hack10ProtectInfoAttempt, Hack10InfoExploitAttemptHack)
            .when(|c: &KioskCtx| c.inputs.info_exploit),
        Transition::new(Hack10InfoExploitAttemptHack, Hack10ProtectInfoAttempt)
            .when(|c: &KioskCtx| c.inputs.exploit_complete),
        Transition::new(Hack09Protect, Hack12ProtectCritical).when(|c: &KioskCtx| c.inputs.ssith_ecu),
        Transition::new(Hack12ProtectCritical, Hack12CriticalExploit)
            .when(|c: &KioskCtx| c.inputs.critical_exploit),
        Transition::new(Hack12CriticalExploit, Hack12ProtectCritical)
            .when(|c: &KioskCtx| c.inputs.exploit_complete),
        Transition::new(Hack02KioskIntro, Reset).when(|c: &KioskCtx| c.inputs.reset),
        Transition::new(Hack05InfoAttempt, Reset).when(|c: &KioskCtx| c.inputs.reset),
        Transition::new(Hack06InfoExploit, Reset).when(|c: &KioskCtx| c.inputs.reset),
        Transition::new(Hack09Protect, Reset).when(|c: &KioskCtx| c.inputs.reset),
        Transition::new(Hack10ProtectInfoAttempt, Reset).when(|c: &KioskCtx| c.inputs.reset),
        Transition::new(Hack12ProtectCritical, Reset).when(|c: &KioskCtx| c.inputs.reset),
    ]
}

pub struct HackerKiosk {
    machine: StateMachine<KioskState, KioskCtx>,
    ctx: KioskCtx,
}

impl HackerKiosk {
    /// Build a kiosk over its two bus channels and an OTA client. `cmd_bus`
    /// is the fan-out C&C channel; `info_bus` is the filtered side door to
    /// the hacked infotainment server.
    pub fn new(
        cmd_bus: Box<dyn Bus>,
        info_bus: Box<dyn Bus>,
        ota: Box<dyn OtaClient>,
        config: &Config,
    ) -> Result<Self, MachineError> {
        let ota_urls = [
            (SCENARIO_BASELINE, config.net.ota_url_baseline.clone()),
            (
                SCENARIO_SECURE_INFOTAINMENT,
                config.net.ota_url_secure_infotainment.clone(),
            ),
            (SCENARIO_SECURE_ECU, config.net.ota_url_secure_ecu.clone()),
        ];
        let mut ctx = KioskCtx {
            cmd_bus,
            info_bus,
            ota,
            ota_urls,
            inputs: KioskInputs::default(),
            state_arg: None,
            response: KioskResponse::ok(),
            active_scenario: SCENARIO_BASELINE,
            brakes_ok: true,
            throttle_ok: true,
            transmission_ok: true,
            lkas_disabled: true,
            hack12_initialized: false,
        };
        ctx.ota.retarget(&config.net.ota_url_baseline);
        let mut machine = StateMachine::new(states(), transitions(), KioskState::Reset)?;
        // establish the baseline scenario before the first submission so the
        // reset action cannot swallow its button input
        machine.prime(&mut ctx);
        Ok(Self { machine, ctx })
    }

    /// Submit one named button press. Unknown names return 501 and leave
    /// the walkthrough untouched.
    pub fn submit(&mut self, func: &str, arg: Option<&str>) -> KioskResponse {
        let Some(button) = Button::from_name(func) else {
            warn!(func, "unknown kiosk function");
            return KioskResponse {
                status: STATUS_NOT_IMPLEMENTED,
                retval: Value::Null,
            };
        };
        self.ctx.inputs = KioskInputs::default();
        match button {
            Button::Next => self.ctx.inputs.next = true,
            Button::Reset => self.ctx.inputs.reset = true,
            Button::InfoExploit => self.ctx.inputs.info_exploit = true,
            Button::CriticalExploit => self.ctx.inputs.critical_exploit = true,
            Button::SsithInfotainment => self.ctx.inputs.ssith_infotainment = true,
            Button::SsithEcu => self.ctx.inputs.ssith_ecu = true,
        }
        self.ctx.state_arg = arg.map(str::to_string);
        self.ctx.response = KioskResponse::ok();
        self.machine.advance(&mut self.ctx);
        self.ctx.response.clone()
    }

    /// Convenience wrapper for the external `{func, args}` record.
    pub fn handle_request(&mut self, request: &KioskRequest) -> KioskResponse {
        let arg = request.args.as_ref().and_then(Value::as_str);
        self.submit(&request.func, arg)
    }

    /// Idle tick between submissions: advance the machine (a no-op unless a
    /// report armed a guard) and log any C&C traffic addressed to us.
    pub fn idle_tick(&mut self) {
        if let Ok(Some(frame)) = self.ctx.cmd_bus.recv(IDLE_CC_TIMEOUT) {
            debug!(id = frame.id, "C&C frame observed by kiosk");
        }
        self.machine.advance(&mut self.ctx);
    }

    pub fn state(&self) -> KioskState {
        self.machine.state()
    }

    pub fn active_scenario(&self) -> u32 {
        self.ctx.active_scenario
    }

    pub fn brakes_ok(&self) -> bool {
        self.ctx.brakes_ok
    }

    pub fn throttle_ok(&self) -> bool {
        self.ctx.throttle_ok
    }

    pub fn transmission_ok(&self) -> bool {
        self.ctx.transmission_ok
    }

    pub fn lkas_disabled(&self) -> bool {
        self.ctx.lkas_disabled
    }
}
