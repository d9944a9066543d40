//! Per-target lifecycle status table.
//!
//! One registry per coordinator process; mutated only from the owning poll
//! loop (or its same-thread subscription drain). Iteration order is
//! registration order, which also fixes the positional indexes used by the
//! internal `"READY <idx>"` / `"RESET <idx>"` event protocol.

use crate::protocol::component_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Ready,
    Reset,
    Wait,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    UnknownTarget(u32),
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::UnknownTarget(id) => match component_name(*id) {
                Some(name) => write!(f, "unknown target {name}"),
                None => write!(f, "unknown target {id:#04x}"),
            },
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Default)]
pub struct TargetRegistry {
    entries: Vec<(u32, TargetStatus)>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` as READY; re-registering an existing target is a
    /// no-op (the first registration fixes its index).
    pub fn register(&mut self, target: u32) {
        if !self.entries.iter().any(|(id, _)| *id == target) {
            self.entries.push((target, TargetStatus::Ready));
        }
    }

    pub fn set_status(&mut self, target: u32, status: TargetStatus) -> Result<(), RegistryError> {
        self.entries
            .iter_mut()
            .find(|(id, _)| *id == target)
            .map(|(_, s)| *s = status)
            .ok_or(RegistryError::UnknownTarget(target))
    }

    pub fn status(&self, target: u32) -> Result<TargetStatus, RegistryError> {
        self.entries
            .iter()
            .find(|(id, _)| *id == target)
            .map(|(_, s)| *s)
            .ok_or(RegistryError::UnknownTarget(target))
    }

    pub fn contains(&self, target: u32) -> bool {
        self.entries.iter().any(|(id, _)| *id == target)
    }

    /// Target identities in registration order.
    pub fn targets(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Targets currently carrying `status`, in registration order.
    pub fn with_status(&self, status: TargetStatus) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(move |(_, s)| *s == status)
            .map(|(id, _)| *id)
    }

    /// Positional index assigned at registration.
    pub fn index_of(&self, target: u32) -> Option<usize> {
        self.entries.iter().position(|(id, _)| *id == target)
    }

    pub fn target_at(&self, index: usize) -> Option<u32> {
        self.entries.get(index).map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SUPERVISOR_MCU, TARGET_1, TARGET_2};

    #[test]
    fn test_registration_order_is_stable() {
        let mut registry = TargetRegistry::new();
        registry.register(SUPERVISOR_MCU);
        registry.register(TARGET_1);
        registry.register(TARGET_2);
        registry.register(TARGET_1); // duplicate registration keeps index 1

        let order: Vec<u32> = registry.targets().collect();
        assert_eq!(order, vec![SUPERVISOR_MCU, TARGET_1, TARGET_2]);
        assert_eq!(registry.index_of(TARGET_1), Some(1));
        assert_eq!(registry.target_at(2), Some(TARGET_2));
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let mut registry = TargetRegistry::new();
        registry.register(TARGET_1);

        assert_eq!(
            registry.status(TARGET_2),
            Err(RegistryError::UnknownTarget(TARGET_2))
        );
        assert_eq!(
            registry.set_status(TARGET_2, TargetStatus::Reset),
            Err(RegistryError::UnknownTarget(TARGET_2))
        );
    }

    #[test]
    fn test_status_filter() {
        let mut registry = TargetRegistry::new();
        registry.register(TARGET_1);
        registry.register(TARGET_2);
        registry.set_status(TARGET_2, TargetStatus::Reset).unwrap();

        let resets: Vec<u32> = registry.with_status(TargetStatus::Reset).collect();
        assert_eq!(resets, vec![TARGET_2]);
        assert_eq!(registry.status(TARGET_1), Ok(TargetStatus::Ready));
    }
}
