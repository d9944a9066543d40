//! Guarded priority state machine engine.
//!
//! A machine is a declared state set, an ordered transition list, and
//! per-state entry actions over some context type `C`. Transition order is a
//! priority order: on each scan the first transition whose source matches,
//! whose guard holds, and whose `unless` predicates all fail is taken.
//! Guards and actions are plain function pointers resolved at construction —
//! there is no name-based attribute lookup at runtime.
//!
//! Entry actions fire once per transition into a state (the initial state's
//! action fires on the first `advance`). `advance` chains transitions
//! through distinct states within one call — an entry action may immediately
//! enable the next guard, e.g. boot -> ready — while a self-loop runs its
//! entry action and then yields to the caller. That yield is what gives the
//! coordinators their one-receive-per-tick cadence in their steady states.

use tracing::debug;

pub type Guard<C> = fn(&C) -> bool;
pub type EntryAction<C> = fn(&mut C);

pub struct StateNode<S, C> {
    pub id: S,
    pub on_enter: Option<EntryAction<C>>,
}

pub struct Transition<S, C> {
    pub source: S,
    pub dest: S,
    /// `None` means unconditional.
    pub guard: Option<Guard<C>>,
    pub unless: Vec<Guard<C>>,
}

impl<S, C> Transition<S, C> {
    pub fn new(source: S, dest: S) -> Self {
        Self {
            source,
            dest,
            guard: None,
            unless: Vec::new(),
        }
    }

    pub fn when(mut self, guard: Guard<C>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn unless(mut self, predicate: Guard<C>) -> Self {
        self.unless.push(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    UndeclaredState(String),
}

impl core::fmt::Display for MachineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MachineError::UndeclaredState(name) => {
                write!(f, "transition references undeclared state {name}")
            }
        }
    }
}

impl std::error::Error for MachineError {}

pub struct StateMachine<S, C> {
    states: Vec<StateNode<S, C>>,
    transitions: Vec<Transition<S, C>>,
    current: S,
    entered_initial: bool,
}

impl<S: Copy + Eq + core::fmt::Debug, C> StateMachine<S, C> {
    /// Build a machine, validating that every transition endpoint and the
    /// initial state are declared.
    pub fn new(
        states: Vec<StateNode<S, C>>,
        transitions: Vec<Transition<S, C>>,
        initial: S,
    ) -> Result<Self, MachineError> {
        let declared = |s: S| states.iter().any(|node| node.id == s);
        if !declared(initial) {
            return Err(MachineError::UndeclaredState(format!("{initial:?}")));
        }
        for t in &transitions {
            if !declared(t.source) {
                return Err(MachineError::UndeclaredState(format!("{:?}", t.source)));
            }
            if !declared(t.dest) {
                return Err(MachineError::UndeclaredState(format!("{:?}", t.dest)));
            }
        }
        Ok(Self {
            states,
            transitions,
            current: initial,
            entered_initial: false,
        })
    }

    pub fn state(&self) -> S {
        self.current
    }

    fn fire_entry(&self, ctx: &mut C) {
        if let Some(action) = self
            .states
            .iter()
            .find(|node| node.id == self.current)
            .and_then(|node| node.on_enter)
        {
            action(ctx);
        }
    }

    /// Fire the initial state's entry action ahead of the first `advance`
    /// call. Useful when the initial action must not interleave with the
    /// first batch of inputs (the kiosk resets to baseline at startup).
    pub fn prime(&mut self, ctx: &mut C) {
        if !self.entered_initial {
            self.entered_initial = true;
            self.fire_entry(ctx);
        }
    }

    /// Run the step algorithm until the machine settles, returning the state
    /// it settled in. Entry actions fire once per transition taken, not once
    /// per tick; a self-loop runs its entry action and ends the chain.
    pub fn advance(&mut self, ctx: &mut C) -> S {
        self.prime(ctx);
        // A chain visiting more transitions than there are declared states
        // implies a guard cycle; yield back to the poll loop instead of
        // spinning inside one call.
        let max_hops = self.states.len();
        let mut hops = 0;
        loop {
            let fired = self.transitions.iter().find(|t| {
                t.source == self.current
                    && t.guard.map_or(true, |g| g(ctx))
                    && t.unless.iter().all(|u| !u(ctx))
            });
            let Some(transition) = fired else {
                return self.current;
            };
            let source = transition.source;
            self.current = transition.dest;
            self.fire_entry(ctx);
            if self.current == source {
                return self.current;
            }
            hops += 1;
            if hops >= max_hops {
                // Free-running machines (the director's steady cycle) hit
                // this in normal operation; the chain resumes next tick.
                debug!(state = ?self.current, hops, "transition chain exceeded state count, yielding");
                return self.current;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestState {
        A,
        B,
        C,
    }

    #[derive(Default)]
    struct TestCtx {
        g1: bool,
        g2: bool,
        entries_a: u32,
        entries_b: u32,
    }

    fn count_a(ctx: &mut TestCtx) {
        ctx.entries_a += 1;
    }

    fn count_b(ctx: &mut TestCtx) {
        ctx.entries_b += 1;
    }

    fn nodes() -> Vec<StateNode<TestState, TestCtx>> {
        vec![
            StateNode {
                id: TestState::A,
                on_enter: Some(count_a),
            },
            StateNode {
                id: TestState::B,
                on_enter: Some(count_b),
            },
            StateNode {
                id: TestState::C,
                on_enter: None,
            },
        ]
    }

    #[test]
    fn test_first_matching_transition_wins() {
        // A -> B and A -> C both enabled; declaration order decides.
        let transitions = vec![
            Transition::new(TestState::A, TestState::B).when(|c: &TestCtx| c.g1),
            Transition::new(TestState::A, TestState::C).when(|c: &TestCtx| c.g2),
        ];
        let mut machine = StateMachine::new(nodes(), transitions, TestState::A).unwrap();
        let mut ctx = TestCtx {
            g1: true,
            g2: true,
            ..TestCtx::default()
        };
        assert_eq!(machine.advance(&mut ctx), TestState::B);
    }

    #[test]
    fn test_unless_blocks_transition() {
        let transitions = vec![
            Transition::new(TestState::A, TestState::B)
                .when(|c: &TestCtx| c.g1)
                .unless(|c: &TestCtx| c.g2),
            Transition::new(TestState::A, TestState::C).when(|c: &TestCtx| c.g2),
        ];
        let mut machine = StateMachine::new(nodes(), transitions, TestState::A).unwrap();
        let mut ctx = TestCtx {
            g1: true,
            g2: true,
            ..TestCtx::default()
        };
        assert_eq!(machine.advance(&mut ctx), TestState::C);
    }

    #[test]
    fn test_chain_through_distinct_states() {
        // A -> B unconditionally, B -> C unconditionally: one advance call.
        let transitions = vec![
            Transition::new(TestState::A, TestState::B),
            Transition::new(TestState::B, TestState::C),
        ];
        let mut machine = StateMachine::new(nodes(), transitions, TestState::A).unwrap();
        let mut ctx = TestCtx::default();
        assert_eq!(machine.advance(&mut ctx), TestState::C);
        assert_eq!(ctx.entries_a, 1);
        assert_eq!(ctx.entries_b, 1);
    }

    #[test]
    fn test_entry_fires_once_per_entry_not_per_tick() {
        let transitions = vec![Transition::new(TestState::A, TestState::B).when(|c: &TestCtx| c.g1)];
        let mut machine = StateMachine::new(nodes(), transitions, TestState::A).unwrap();
        let mut ctx = TestCtx::default();
        machine.advance(&mut ctx);
        machine.advance(&mut ctx);
        machine.advance(&mut ctx);
        assert_eq!(ctx.entries_a, 1);
    }

    #[test]
    fn test_self_loop_runs_entry_then_yields() {
        let transitions = vec![Transition::new(TestState::A, TestState::A)];
        let mut machine = StateMachine::new(nodes(), transitions, TestState::A).unwrap();
        let mut ctx = TestCtx::default();
        // first advance: initial entry plus one self-loop entry
        machine.advance(&mut ctx);
        assert_eq!(ctx.entries_a, 2);
        // each further advance re-enters exactly once
        machine.advance(&mut ctx);
        assert_eq!(ctx.entries_a, 3);
        assert_eq!(machine.state(), TestState::A);
    }

    #[test]
    fn test_guard_cycle_is_cut_off() {
        // A <-> B with no guards would spin forever without the hop cap.
        let transitions = vec![
            Transition::new(TestState::A, TestState::B),
            Transition::new(TestState::B, TestState::A),
        ];
        let mut machine = StateMachine::new(nodes(), transitions, TestState::A).unwrap();
        let mut ctx = TestCtx::default();
        machine.advance(&mut ctx);
        assert!(ctx.entries_a + ctx.entries_b <= 4);
    }

    #[test]
    fn test_undeclared_state_rejected() {
        let transitions = vec![Transition::new(TestState::A, TestState::B)];
        let result: Result<StateMachine<TestState, TestCtx>, _> = StateMachine::new(
            vec![StateNode {
                id: TestState::A,
                on_enter: None,
            }],
            transitions,
            TestState::A,
        );
        assert!(matches!(result, Err(MachineError::UndeclaredState(_))));
    }
}
