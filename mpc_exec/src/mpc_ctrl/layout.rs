//! # Horizon variable layout
//!
//! The optimiser works on a single flat vector holding every state and
//! actuation in the horizon. For a horizon of `N` states the layout is
//!
//! | Block    | Offset   | Length  |
//! |----------|----------|---------|
//! | x        | 0        | N       |
//! | y        | N        | N       |
//! | psi      | 2N       | N       |
//! | v        | 3N       | N       |
//! | cte      | 4N       | N       |
//! | epsi     | 5N       | N       |
//! | steer    | 6N       | N - 1   |
//! | throttle | 7N - 1   | N - 1   |
//!
//! giving `8N - 2` variables. Constraints are laid out in the same way, the
//! dynamics constraint on state component `k` between steps `i` and `i + 1`
//! is at row `k (N - 1) + i`.
//!
//! Nothing outside this module should compute an index by hand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::vehicle_model::{Actuation, VehicleState, NUM_ACTUATORS, NUM_STATES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Index scheme for a horizon of a given length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonLayout {
    horizon_len: usize,
}

/// Read only typed access to a flat horizon vector.
#[derive(Debug, Clone, Copy)]
pub struct HorizonView<'a> {
    layout: HorizonLayout,
    vars: &'a [f64],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Components of the vehicle state, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateComponent {
    X,
    Y,
    Psi,
    V,
    Cte,
    Epsi,
}

/// Components of an actuation, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorComponent {
    Steer,
    Throttle,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StateComponent {
    pub const ALL: [StateComponent; NUM_STATES] = [
        StateComponent::X,
        StateComponent::Y,
        StateComponent::Psi,
        StateComponent::V,
        StateComponent::Cte,
        StateComponent::Epsi,
    ];

    /// Position of the component in `VehicleState::to_array`.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl ActuatorComponent {
    pub const ALL: [ActuatorComponent; NUM_ACTUATORS] =
        [ActuatorComponent::Steer, ActuatorComponent::Throttle];

    /// Position of the component in `Actuation::to_array`.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl HorizonLayout {
    /// Create a layout for `horizon_len` states. Lengths below 2 are
    /// rejected when the parameters are validated.
    pub fn new(horizon_len: usize) -> Self {
        Self { horizon_len }
    }

    /// Number of states in the horizon.
    pub fn horizon_len(&self) -> usize {
        self.horizon_len
    }

    /// Number of actuations in the horizon.
    pub fn num_actuations(&self) -> usize {
        self.horizon_len.saturating_sub(1)
    }

    pub fn num_vars(&self) -> usize {
        NUM_STATES * self.horizon_len + NUM_ACTUATORS * self.num_actuations()
    }

    pub fn num_constraints(&self) -> usize {
        NUM_STATES * self.num_actuations()
    }

    /// Index of a state component at step `step`.
    pub fn state(&self, comp: StateComponent, step: usize) -> usize {
        debug_assert!(step < self.horizon_len);
        comp.index() * self.horizon_len + step
    }

    /// Index of an actuator component at step `step`.
    pub fn actuator(&self, comp: ActuatorComponent, step: usize) -> usize {
        debug_assert!(step < self.num_actuations());
        NUM_STATES * self.horizon_len + comp.index() * self.num_actuations() + step
    }

    /// Row of the dynamics constraint on `comp` between `step` and `step + 1`.
    pub fn constraint(&self, comp: StateComponent, step: usize) -> usize {
        debug_assert!(step < self.num_actuations());
        comp.index() * self.num_actuations() + step
    }

    /// Write a state into the flat vector at step `step`.
    pub fn set_state(&self, vars: &mut [f64], step: usize, state: &VehicleState) {
        for (comp, val) in StateComponent::ALL.iter().zip(state.to_array().iter()) {
            vars[self.state(*comp, step)] = *val;
        }
    }

    /// Write an actuation into the flat vector at step `step`.
    pub fn set_actuation(&self, vars: &mut [f64], step: usize, act: &Actuation) {
        for (comp, val) in ActuatorComponent::ALL.iter().zip(act.to_array().iter()) {
            vars[self.actuator(*comp, step)] = *val;
        }
    }

    /// Borrow a flat vector as a horizon.
    ///
    /// Returns `None` if the vector is the wrong length.
    pub fn view<'a>(&self, vars: &'a [f64]) -> Option<HorizonView<'a>> {
        if vars.len() == self.num_vars() {
            Some(HorizonView { layout: *self, vars })
        }
        else {
            None
        }
    }
}

impl<'a> HorizonView<'a> {
    pub fn layout(&self) -> &HorizonLayout {
        &self.layout
    }

    pub fn get(&self, comp: StateComponent, step: usize) -> f64 {
        self.vars[self.layout.state(comp, step)]
    }

    pub fn get_act(&self, comp: ActuatorComponent, step: usize) -> f64 {
        self.vars[self.layout.actuator(comp, step)]
    }

    pub fn state(&self, step: usize) -> VehicleState {
        VehicleState::from_array(StateComponent::ALL.map(|c| self.get(c, step)))
    }

    pub fn actuation(&self, step: usize) -> Actuation {
        Actuation::from_array(ActuatorComponent::ALL.map(|c| self.get_act(c, step)))
    }

    /// All states of the horizon in order.
    pub fn states(&self) -> Vec<VehicleState> {
        (0..self.layout.horizon_len).map(|i| self.state(i)).collect()
    }

    /// All actuations of the horizon in order.
    pub fn actuations(&self) -> Vec<Actuation> {
        (0..self.layout.num_actuations()).map(|i| self.actuation(i)).collect()
    }

    /// Predicted `(x, y)` positions of every state.
    pub fn positions(&self) -> (Vec<f64>, Vec<f64>) {
        (0..self.layout.horizon_len)
            .map(|i| (self.get(StateComponent::X, i), self.get(StateComponent::Y, i)))
            .unzip()
    }
}
