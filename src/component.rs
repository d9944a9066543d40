//! Managed subordinate components.
//!
//! The director governs a handful of subordinate units (driving simulator,
//! speed display, lighting, in-car display proxy). Their internals are
//! external collaborators; this module only fixes the seam: a start/stop/
//! message lifecycle returning a status, and a handler that owns the set.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    Ready,
    Error,
    RestartFinished,
    RestartFailed,
    AutopilotEnabled,
    AutopilotDisabled,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentCommand {
    Restart,
    EnableAutopilot,
    DisableAutopilot,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    UnknownComponent(String),
}

impl core::fmt::Display for ComponentError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ComponentError::UnknownComponent(name) => write!(f, "unknown component {name}"),
        }
    }
}

impl std::error::Error for ComponentError {}

/// Lifecycle seam for one subordinate unit.
pub trait ManagedComponent {
    fn name(&self) -> &'static str;
    fn start(&mut self) -> ComponentStatus;
    fn handle(&mut self, command: ComponentCommand) -> ComponentStatus;
    fn stop(&mut self);
}

/// Owns the subordinate set for one coordinator; components are started in
/// registration order and stopped in reverse.
#[derive(Default)]
pub struct ComponentHandler {
    components: Vec<Box<dyn ManagedComponent>>,
}

impl ComponentHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Box<dyn ManagedComponent>) {
        debug!(name = component.name(), "registering component");
        self.components.push(component);
    }

    pub fn start(&mut self, name: &str) -> Result<ComponentStatus, ComponentError> {
        let component = self.find(name)?;
        let status = component.start();
        info!(name, ?status, "component start");
        Ok(status)
    }

    pub fn message(
        &mut self,
        name: &str,
        command: ComponentCommand,
    ) -> Result<ComponentStatus, ComponentError> {
        let component = self.find(name)?;
        let status = component.handle(command);
        debug!(name, ?command, ?status, "component message");
        Ok(status)
    }

    pub fn exit(&mut self) {
        for component in self.components.iter_mut().rev() {
            info!(name = component.name(), "stopping component");
            component.stop();
        }
    }

    fn find(&mut self, name: &str) -> Result<&mut (dyn ManagedComponent + 'static), ComponentError> {
        self.components
            .iter_mut()
            .find(|c| c.name() == name)
            .map(|c| c.as_mut())
            .ok_or_else(|| ComponentError::UnknownComponent(name.to_string()))
    }
}

/// Deterministic stand-in used by the demo binaries and the tests: start and
/// restart outcomes are scripted up front.
pub struct ScriptedComponent {
    name: &'static str,
    start_status: ComponentStatus,
    restart_outcomes: std::collections::VecDeque<ComponentStatus>,
    started: bool,
    autopilot: bool,
}

impl ScriptedComponent {
    pub fn ready(name: &'static str) -> Self {
        Self {
            name,
            start_status: ComponentStatus::Ready,
            restart_outcomes: std::collections::VecDeque::new(),
            started: false,
            autopilot: false,
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            start_status: ComponentStatus::Error,
            ..Self::ready(name)
        }
    }

    /// Queue the outcome of the next restart request; once the queue runs
    /// dry restarts succeed.
    pub fn queue_restart_outcome(mut self, status: ComponentStatus) -> Self {
        self.restart_outcomes.push_back(status);
        self
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl ManagedComponent for ScriptedComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self) -> ComponentStatus {
        self.started = matches!(self.start_status, ComponentStatus::Ready);
        self.start_status
    }

    fn handle(&mut self, command: ComponentCommand) -> ComponentStatus {
        match command {
            ComponentCommand::Restart => self
                .restart_outcomes
                .pop_front()
                .unwrap_or(ComponentStatus::RestartFinished),
            ComponentCommand::EnableAutopilot => {
                self.autopilot = true;
                ComponentStatus::AutopilotEnabled
            }
            ComponentCommand::DisableAutopilot => {
                self.autopilot = false;
                ComponentStatus::AutopilotDisabled
            }
            ComponentCommand::Stop => {
                self.started = false;
                ComponentStatus::Stopped
            }
        }
    }

    fn stop(&mut self) {
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_routes_by_name() {
        let mut handler = ComponentHandler::new();
        handler.register(Box::new(ScriptedComponent::ready("sim")));
        handler.register(Box::new(ScriptedComponent::failing("lighting")));

        assert_eq!(handler.start("sim"), Ok(ComponentStatus::Ready));
        assert_eq!(handler.start("lighting"), Ok(ComponentStatus::Error));
        assert!(matches!(
            handler.start("unknown"),
            Err(ComponentError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_scripted_restart_outcomes_drain_in_order() {
        let mut handler = ComponentHandler::new();
        handler.register(Box::new(
            ScriptedComponent::ready("sim")
                .queue_restart_outcome(ComponentStatus::RestartFailed)
                .queue_restart_outcome(ComponentStatus::RestartFinished),
        ));

        assert_eq!(
            handler.message("sim", ComponentCommand::Restart),
            Ok(ComponentStatus::RestartFailed)
        );
        assert_eq!(
            handler.message("sim", ComponentCommand::Restart),
            Ok(ComponentStatus::RestartFinished)
        );
        // queue exhausted: restarts succeed from here on
        assert_eq!(
            handler.message("sim", ComponentCommand::Restart),
            Ok(ComponentStatus::RestartFinished)
        );
    }
}
